//! Tesseract OCR backend
//!
//! Runs the `tesseract` command line on a grayscale PNG and parses its TSV
//! output (`image_to_data` layout) into word detections.

use parking_lot::Mutex;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

use super::{RecognizeError, Recognizer, WordDetection};
use crate::capture::frame::CapturedFrame;

/// TSV row level for individual words
const WORD_LEVEL: u32 = 5;
/// Columns in a TSV row, text last
const TSV_COLUMNS: usize = 12;

/// Tesseract command line wrapper
pub struct TesseractRecognizer {
    program: String,
    /// Engine run currently in flight, so it can be killed from another thread
    running: Mutex<Option<Child>>,
    aborted: AtomicBool,
}

impl TesseractRecognizer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            running: Mutex::new(None),
            aborted: AtomicBool::new(false),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn run(&self, input: &std::path::Path, language: &str) -> Result<String, RecognizeError> {
        let mut child = Command::new(&self.program)
            .arg(input)
            .arg("stdout")
            .args(["-l", language, "--oem", "1", "tsv"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RecognizeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let mut stdout = child.stdout.take();
        let stderr = child.stderr.take();
        *self.running.lock() = Some(child);

        // stderr is drained on its own thread so a full stderr pipe cannot
        // stall the engine while stdout is read
        let stderr_reader = stderr.map(|mut err| {
            std::thread::spawn(move || {
                let mut diagnostics = String::new();
                let _ = err.read_to_string(&mut diagnostics);
                diagnostics
            })
        });

        // Read without holding the lock so abort() can reach the child
        let mut tsv = String::new();
        let read_result = match stdout.as_mut() {
            Some(out) => out.read_to_string(&mut tsv).map(|_| ()),
            None => Ok(()),
        };
        let diagnostics = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();

        let status = match self.running.lock().take() {
            Some(mut child) => child.wait().map_err(|e| RecognizeError::Engine(e.to_string()))?,
            None => return Err(RecognizeError::Aborted),
        };

        if self.aborted.swap(false, Ordering::SeqCst) {
            return Err(RecognizeError::Aborted);
        }
        read_result.map_err(|e| RecognizeError::Engine(format!("Failed to read OCR output: {}", e)))?;

        if !status.success() {
            let message = if diagnostics.trim().is_empty() {
                format!("{} exited with {}", self.program, status)
            } else {
                format!("{}: {}", self.program, diagnostics.trim())
            };
            return Err(RecognizeError::Engine(message));
        }

        Ok(tsv)
    }
}

impl Recognizer for TesseractRecognizer {
    fn recognize(
        &self,
        frame: &CapturedFrame,
        language: &str,
    ) -> Result<Vec<WordDetection>, RecognizeError> {
        if frame.is_empty() {
            return Ok(vec![]);
        }

        let gray = frame.to_grayscale().ok_or(RecognizeError::InvalidFrame)?;
        let input = tempfile::Builder::new()
            .prefix("ocr-sketch-input-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| RecognizeError::Input(e.to_string()))?;
        gray.save_with_format(input.path(), image::ImageFormat::Png)
            .map_err(|e| RecognizeError::Input(e.to_string()))?;

        let (width, height) = frame.dimensions();
        debug!("Tesseract: Processing {}x{} image", width, height);
        let tsv = self.run(input.path(), language)?;
        let words = parse_tsv(&tsv);
        debug!("Tesseract: Found {} words", words.len());

        Ok(words)
    }

    fn abort(&self) {
        if let Some(child) = self.running.lock().as_mut() {
            self.aborted.store(true, Ordering::SeqCst);
            match child.kill() {
                Ok(()) => warn!("Killed in-flight tesseract process {}", child.id()),
                Err(e) => debug!("Tesseract process already gone: {}", e),
            }
        }
    }
}

/// Parse tesseract TSV output, keeping word-level rows only.
///
/// The header row and rows that do not parse are skipped.
pub fn parse_tsv(tsv: &str) -> Vec<WordDetection> {
    tsv.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let row = parse_row(line);
            if row.is_none() && !line.starts_with("level") {
                debug!("Skipping malformed TSV row: {:?}", line);
            }
            row
        })
        .collect()
}

fn parse_row(line: &str) -> Option<WordDetection> {
    let fields: Vec<&str> = line.splitn(TSV_COLUMNS, '\t').collect();
    if fields.len() < TSV_COLUMNS - 1 {
        return None;
    }

    let level: u32 = fields[0].trim().parse().ok()?;
    if level != WORD_LEVEL {
        return None;
    }

    let uint = |i: usize| fields[i].trim().parse::<u32>().ok();
    let int = |i: usize| fields[i].trim().parse::<i32>().ok();

    Some(WordDetection {
        page_num: uint(1)?,
        block_num: uint(2)?,
        par_num: uint(3)?,
        line_num: uint(4)?,
        word_num: uint(5)?,
        left: int(6)?,
        top: int(7)?,
        width: int(8)?,
        height: int(9)?,
        conf: fields[10].trim().parse().ok()?,
        text: fields
            .get(11)
            .map(|t| t.trim_end_matches(['\r', '\n']).to_string())
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t1920\t1080\t-1\t
2\t1\t1\t0\t0\t0\t36\t92\t582\t68\t-1\t
3\t1\t1\t1\t0\t0\t36\t92\t582\t68\t-1\t
4\t1\t1\t1\t1\t0\t36\t92\t344\t32\t-1\t
5\t1\t1\t1\t1\t1\t36\t92\t150\t32\t96.063751\tHello
5\t1\t1\t1\t1\t2\t200\t92\t180\t32\t91.5\tWorld
5\t1\t1\t1\t1\t3\t390\t92\t10\t32\t95\t
";

    #[test]
    fn test_parse_tsv_keeps_word_rows() {
        let words = parse_tsv(SAMPLE);

        assert_eq!(words.len(), 3);
        assert_eq!(words[0].text, "Hello");
        assert_eq!(words[0].paragraph_key(), (1, 1, 1));
        assert_eq!(words[0].reading_order(), (1, 1));
        assert_eq!((words[0].left, words[0].top, words[0].width, words[0].height), (36, 92, 150, 32));
        assert!((words[0].conf - 96.063_751).abs() < 1e-4);
        assert_eq!(words[1].text, "World");
        assert_eq!(words[2].text, "");
    }

    #[test]
    fn test_parse_tsv_skips_malformed_rows() {
        let tsv = "5\t1\t1\t1\t1\tx\t0\t0\t10\t10\t90\tbad\n5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t90\tgood\n5\t1";

        let words = parse_tsv(tsv);

        assert_eq!(words.len(), 1);
        assert_eq!(words[0].text, "good");
    }

    #[test]
    fn test_parse_tsv_handles_crlf_and_missing_text() {
        let tsv = "5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t90\tword\r\n5\t1\t1\t1\t1\t2\t0\t0\t10\t10\t-1";

        let words = parse_tsv(tsv);

        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "word");
        assert_eq!(words[1].text, "");
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_tsv("").is_empty());
    }

    #[test]
    fn test_empty_frame_skips_engine() {
        let recognizer = TesseractRecognizer::new("ocr-sketch-no-such-tesseract");
        let frame = CapturedFrame::new(vec![], 0, 0);

        assert!(recognizer.recognize(&frame, "eng").unwrap().is_empty());
    }

    #[test]
    fn test_missing_engine_reports_spawn_error() {
        let recognizer = TesseractRecognizer::new("ocr-sketch-no-such-tesseract");
        let frame = CapturedFrame::new(vec![255; 4 * 4], 2, 2);

        let result = recognizer.recognize(&frame, "eng");

        assert!(matches!(result, Err(RecognizeError::Spawn { .. })));
    }

    /// Write an executable shell script standing in for tesseract
    #[cfg(unix)]
    fn fake_engine(body: &str) -> (tempfile::TempDir, String) {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake-tesseract");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        (dir, path.to_string_lossy().into_owned())
    }

    /// Run recognize on a helper thread, giving up after `timeout`
    #[cfg(unix)]
    fn recognize_within(
        program: String,
        timeout: std::time::Duration,
    ) -> Option<Result<Vec<WordDetection>, RecognizeError>> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        std::thread::spawn(move || {
            let recognizer = TesseractRecognizer::new(program);
            let frame = CapturedFrame::new(vec![255; 4 * 4], 2, 2);
            // A freshly written script can briefly be busy for exec
            let mut result = recognizer.recognize(&frame, "eng");
            for _ in 0..5 {
                match &result {
                    Err(RecognizeError::Spawn { source, .. }) if source.raw_os_error() == Some(26) => {
                        std::thread::sleep(std::time::Duration::from_millis(50));
                        result = recognizer.recognize(&frame, "eng");
                    }
                    _ => break,
                }
            }
            let _ = tx.send(result);
        });
        rx.recv_timeout(timeout).ok()
    }

    #[cfg(unix)]
    #[test]
    fn test_large_stderr_output_does_not_stall() {
        let (_dir, program) = fake_engine(
            "head -c 200000 /dev/zero | tr '\\0' 'x' >&2\nprintf '5\\t1\\t1\\t1\\t1\\t1\\t0\\t0\\t10\\t10\\t90\\tword\\n'",
        );

        let result = recognize_within(program, std::time::Duration::from_secs(10))
            .expect("recognize did not finish");

        let words = result.unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].text, "word");
    }

    #[cfg(unix)]
    #[test]
    fn test_engine_failure_reports_stderr() {
        let (_dir, program) = fake_engine("echo 'Failed loading language xyz' >&2\nexit 1");

        let result = recognize_within(program, std::time::Duration::from_secs(10))
            .expect("recognize did not finish");

        match result {
            Err(RecognizeError::Engine(message)) => assert!(message.contains("Failed loading language xyz")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_abort_without_run_is_noop() {
        let recognizer = TesseractRecognizer::new("tesseract");
        recognizer.abort();
        assert!(!recognizer.aborted.load(Ordering::SeqCst));
    }
}
