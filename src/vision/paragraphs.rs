//! Paragraph aggregation
//!
//! Words sharing `(page_num, block_num, par_num)` form one paragraph. Text is
//! joined in `(line_num, word_num)` order, the box is the tight union of the
//! member boxes and the confidence is the member mean.

use std::collections::BTreeMap;

use super::{Paragraph, ParagraphKey, WordDetection};

/// Merge word detections into paragraphs, keeping those whose mean
/// confidence is strictly above `par_conf_threshold`.
///
/// Paragraphs come out in ascending key order. Blank words are joined as-is.
pub fn aggregate_paragraphs(words: &[WordDetection], par_conf_threshold: i32) -> Vec<Paragraph> {
    let mut groups: BTreeMap<ParagraphKey, Vec<&WordDetection>> = BTreeMap::new();
    for word in words {
        groups.entry(word.paragraph_key()).or_default().push(word);
    }

    let threshold = f64::from(par_conf_threshold);
    groups
        .into_iter()
        .filter_map(|(key, mut members)| {
            members.sort_by_key(|w| w.reading_order());
            merge_group(key, &members)
        })
        .filter(|paragraph| paragraph.conf > threshold)
        .collect()
}

fn merge_group(key: ParagraphKey, members: &[&WordDetection]) -> Option<Paragraph> {
    let first = members.first()?;

    let text = members
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let (mut left, mut top) = (first.left, first.top);
    let (mut right, mut bottom) = (first.right(), first.bottom());
    let mut conf_sum = 0.0;
    for w in members {
        left = left.min(w.left);
        top = top.min(w.top);
        right = right.max(w.right());
        bottom = bottom.max(w.bottom());
        conf_sum += f64::from(w.conf);
    }

    Some(Paragraph {
        page_num: key.0,
        block_num: key.1,
        par_num: key.2,
        text,
        left,
        top,
        width: right - left,
        height: bottom - top,
        conf: conf_sum / members.len() as f64,
    })
}
