//! Tesseract Engine
//!
//! Runs the `tesseract` CLI with TSV output and groups the word rows into
//! lines.
//!
//! ## Requirements
//!
//! - `tesseract` must be installed and available in PATH (or configured via
//!   `OCR_TESSERACT_PATH`)
//! - the language packs named in `OCR_LANG` must be installed
//! - `osd` must be installed when orientation classification is enabled
//!
//! In-memory images are piped as PNG on stdin; file inputs are passed by path.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::provider::{EngineFactory, OcrEngine};
use super::raw::{RawDetection, RawOutput, RawPage};
use super::types::{EngineError, EngineInput, RecognizeOptions};

/// TSV level of a text line row
const TSV_LINE_LEVEL: u32 = 4;
/// TSV level of a word row
const TSV_WORD_LEVEL: u32 = 5;
/// Rows carry at least `level .. conf`; `text` may be absent on structural rows
const TSV_MIN_FIELDS: usize = 11;

/// Page segmentation with orientation and script detection
const PSM_WITH_OSD: &str = "1";
/// Fully automatic page segmentation, no OSD
const PSM_AUTO: &str = "3";
/// Orientation and script detection pack
const OSD_LANGUAGE: &str = "osd";

/// OCR engine backed by the tesseract CLI
#[derive(Debug)]
pub struct TesseractEngine {
    binary: String,
    language: String,
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn recognize(
        &self,
        input: EngineInput<'_>,
        options: &RecognizeOptions,
    ) -> Result<RawOutput, EngineError> {
        let psm = if options.classify_orientation {
            PSM_WITH_OSD
        } else {
            PSM_AUTO
        };

        let mut cmd = Command::new(&self.binary);
        let stdin_data = match input {
            EngineInput::File(path) => {
                cmd.arg(path);
                None
            }
            EngineInput::Pixels(image) => {
                cmd.arg("stdin");
                let png = image.to_png().map_err(|e| {
                    EngineError::ProcessingError(format!("Failed to encode image: {}", e))
                })?;
                Some(png)
            }
        };

        cmd.arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(psm)
            .arg("tsv")
            .stdin(if stdin_data.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            EngineError::ProcessingError(format!("Failed to spawn tesseract: {}", e))
        })?;

        if let (Some(data), Some(mut stdin)) = (stdin_data, child.stdin.take()) {
            if let Err(e) = stdin.write_all(&data).await {
                let _ = child.kill().await;
                return Err(EngineError::ProcessingError(format!(
                    "Failed to write to tesseract stdin: {}",
                    e
                )));
            }
            // Closing stdin signals end of input
            drop(stdin);
        }

        let output = child.wait_with_output().await.map_err(|e| {
            EngineError::ProcessingError(format!("Failed to wait for tesseract: {}", e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::ProcessingError(format!(
                "tesseract failed: {}",
                stderr.trim()
            )));
        }

        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Verifies the binary and language packs before handing out an engine
pub struct TesseractFactory {
    binary: String,
    language: String,
    /// `--psm 1` needs the `osd` pack
    classify_orientation: bool,
}

impl TesseractFactory {
    pub fn new(binary: &str, language: &str, classify_orientation: bool) -> Self {
        Self {
            binary: binary.to_string(),
            language: language.to_string(),
            classify_orientation,
        }
    }

    async fn run(&self, arg: &str) -> Result<String, EngineError> {
        let output = Command::new(&self.binary)
            .arg(arg)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| EngineError::InitFailed(format!("Failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(EngineError::InitFailed(format!(
                "{} {} exited with {}",
                self.binary, arg, output.status
            )));
        }

        // Older releases print these to stderr
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }
}

#[async_trait]
impl EngineFactory for TesseractFactory {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn build(&self) -> Result<Arc<dyn OcrEngine>, EngineError> {
        validate_language(&self.language)?;

        let version = self.run("--version").await?;
        tracing::info!(
            "Found {}",
            version.lines().next().unwrap_or("tesseract").trim()
        );

        let installed = self.run("--list-langs").await?;
        let required = required_languages(&self.language, self.classify_orientation);
        let missing = missing_languages(&required, &installed);
        if !missing.is_empty() {
            return Err(EngineError::InitFailed(format!(
                "tesseract language pack(s) not installed: {}",
                missing.join(", ")
            )));
        }

        Ok(Arc::new(TesseractEngine {
            binary: self.binary.clone(),
            language: self.language.clone(),
        }))
    }
}

/// Validate language code to prevent argument injection
fn validate_language(lang: &str) -> Result<(), EngineError> {
    // Language codes should be alphanumeric with optional underscore/plus (e.g., "eng", "chi_sim+eng")
    if lang.is_empty() || lang.len() > 64 {
        return Err(EngineError::InitFailed("Invalid language code length".to_string()));
    }
    if let Some(c) = lang
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '+' && *c != '_')
    {
        return Err(EngineError::InitFailed(format!(
            "Invalid character in language code: {}",
            c
        )));
    }
    Ok(())
}

/// Packs named in `language` (`a+b+c`), plus `osd` for orientation detection
fn required_languages(language: &str, classify_orientation: bool) -> Vec<&str> {
    let mut required: Vec<&str> = language.split('+').filter(|lang| !lang.is_empty()).collect();
    if classify_orientation && !required.contains(&OSD_LANGUAGE) {
        required.push(OSD_LANGUAGE);
    }
    required
}

/// Entries of `required` absent from `--list-langs` output
fn missing_languages<'a>(required: &[&'a str], listing: &str) -> Vec<&'a str> {
    let installed: Vec<&str> = listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains(' '))
        .collect();

    required
        .iter()
        .copied()
        .filter(|lang| !installed.contains(lang))
        .collect()
}

/// Words grouped under one tesseract line
#[derive(Debug)]
struct LineRows {
    page: u32,
    bounds: Option<[i64; 4]>,
    words: Vec<String>,
    confidences: Vec<f64>,
}

/// Turn tesseract TSV into raw output: one detection per text line, the line
/// box as a four-point polygon, confidence the mean word confidence scaled
/// to [0, 1].
pub(crate) fn parse_tsv(tsv: &str) -> RawOutput {
    let mut order: Vec<(u32, u32, u32, u32)> = Vec::new();
    let mut lines: HashMap<(u32, u32, u32, u32), LineRows> = HashMap::new();

    for (line_num, row) in tsv.lines().enumerate() {
        if line_num == 0 && row.starts_with("level") {
            continue;
        }

        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < TSV_MIN_FIELDS {
            continue;
        }

        let number = |i: usize| fields[i].trim().parse::<i64>().unwrap_or(0);
        let level = number(0) as u32;
        if level != TSV_LINE_LEVEL && level != TSV_WORD_LEVEL {
            continue;
        }

        let key = (number(1) as u32, number(2) as u32, number(3) as u32, number(4) as u32);
        let bounds = [number(6), number(7), number(8), number(9)];

        let entry = lines.entry(key).or_insert_with(|| {
            order.push(key);
            LineRows {
                page: key.0,
                bounds: None,
                words: Vec::new(),
                confidences: Vec::new(),
            }
        });

        if level == TSV_LINE_LEVEL {
            entry.bounds = Some(bounds);
            continue;
        }

        let conf = fields[10].trim().parse::<f64>().unwrap_or(-1.0);
        let text = fields.get(11).map(|t| t.trim()).unwrap_or("");
        if conf < 0.0 || text.is_empty() {
            continue;
        }

        if entry.bounds.is_none() {
            entry.bounds = Some(bounds);
        }
        entry.words.push(text.to_string());
        entry.confidences.push(conf);
    }

    let mut pages: Vec<RawPage> = Vec::new();
    let mut current_page: Option<u32> = None;

    for key in order {
        let Some(line) = lines.remove(&key) else {
            continue;
        };
        if line.words.is_empty() {
            continue;
        }

        if current_page != Some(line.page) {
            pages.push(RawPage::default());
            current_page = Some(line.page);
        }

        let confidence =
            line.confidences.iter().sum::<f64>() / line.confidences.len() as f64 / 100.0;
        let polygon = line.bounds.map(|[left, top, width, height]| {
            let (l, t) = (left as f64, top as f64);
            let (r, b) = ((left + width) as f64, (top + height) as f64);
            vec![[l, t], [r, t], [r, b], [l, b]]
        });

        if let Some(page) = pages.last_mut() {
            page.detections.push(RawDetection {
                polygon,
                text: line.words.join(" "),
                confidence,
            });
        }
    }

    RawOutput::from_pages(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn test_parse_tsv_groups_words_into_lines() {
        let tsv = format!(
            "{}\n\
             1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t\n\
             4\t1\t1\t1\t1\t0\t10\t20\t200\t30\t-1\t\n\
             5\t1\t1\t1\t1\t1\t10\t20\t90\t30\t96.0\tHello\n\
             5\t1\t1\t1\t1\t2\t110\t20\t100\t30\t90.0\tWorld\n\
             4\t1\t1\t1\t2\t0\t10\t60\t80\t30\t-1\t\n\
             5\t1\t1\t1\t2\t1\t10\t60\t80\t30\t80.0\tAgain\n",
            HEADER
        );

        let raw = parse_tsv(&tsv);
        let detections: Vec<_> = raw.detections().collect();
        assert_eq!(detections.len(), 2);

        assert_eq!(detections[0].text, "Hello World");
        assert!((detections[0].confidence - 0.93).abs() < 1e-9);
        assert_eq!(
            detections[0].polygon,
            Some(vec![[10.0, 20.0], [210.0, 20.0], [210.0, 50.0], [10.0, 50.0]])
        );

        assert_eq!(detections[1].text, "Again");
        assert!((detections[1].confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_parse_tsv_blank_image_is_empty() {
        let tsv = format!(
            "{}\n1\t1\t0\t0\t0\t0\t0\t0\t10\t10\t-1\t\n2\t1\t1\t0\t0\t0\t0\t0\t10\t10\t-1\t\n",
            HEADER
        );
        assert_eq!(parse_tsv(&tsv), RawOutput::Empty);
        assert_eq!(parse_tsv(""), RawOutput::Empty);
    }

    #[test]
    fn test_parse_tsv_skips_whitespace_words() {
        let tsv = format!(
            "{}\n5\t1\t1\t1\t1\t1\t0\t0\t5\t5\t95.0\t \n5\t1\t1\t1\t1\t2\t6\t0\t5\t5\t50.0\tok\n",
            HEADER
        );
        let raw = parse_tsv(&tsv);
        let detections: Vec<_> = raw.detections().collect();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].text, "ok");
        assert!((detections[0].confidence - 0.5).abs() < 1e-9);
        // No line row: the first word's box stands in
        assert_eq!(
            detections[0].polygon,
            Some(vec![[6.0, 0.0], [11.0, 0.0], [11.0, 5.0], [6.0, 5.0]])
        );
    }

    #[test]
    fn test_parse_tsv_multiple_pages() {
        let tsv = format!(
            "{}\n5\t1\t1\t1\t1\t1\t0\t0\t5\t5\t90\tone\n5\t2\t1\t1\t1\t1\t0\t0\t5\t5\t90\ttwo\n",
            HEADER
        );
        match parse_tsv(&tsv) {
            RawOutput::Pages(pages) => {
                assert_eq!(pages.len(), 2);
                assert_eq!(pages[1].detections[0].text, "two");
            }
            RawOutput::Empty => panic!("expected two pages"),
        }
    }

    #[test]
    fn test_validate_language() {
        assert!(validate_language("eng").is_ok());
        assert!(validate_language("chi_sim+eng").is_ok());
        assert!(validate_language("").is_err());
        assert!(validate_language("eng --oem 0").is_err());
        assert!(validate_language("eng;rm").is_err());
    }

    #[test]
    fn test_missing_languages() {
        let listing = "List of available languages in \"/usr/share/tessdata/\" (3):\neng\nosd\nchi_sim\n";
        assert!(missing_languages(&required_languages("chi_sim+eng", false), listing).is_empty());
        assert_eq!(missing_languages(&required_languages("eng+deu", false), listing), vec!["deu"]);
    }

    #[test]
    fn test_orientation_requires_osd() {
        assert_eq!(required_languages("chi_sim+eng", false), vec!["chi_sim", "eng"]);
        assert_eq!(required_languages("chi_sim+eng", true), vec!["chi_sim", "eng", "osd"]);
        assert_eq!(required_languages("eng+osd", true), vec!["eng", "osd"]);

        let without_osd = "List of available languages in \"/usr/share/tessdata/\" (2):\neng\nchi_sim\n";
        assert!(missing_languages(&required_languages("chi_sim+eng", false), without_osd).is_empty());
        assert_eq!(
            missing_languages(&required_languages("chi_sim+eng", true), without_osd),
            vec!["osd"]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_init_failure() {
        let factory = TesseractFactory::new("/nonexistent/tesseract-binary", "eng", false);
        let err = factory.build().await.err().unwrap();
        assert!(matches!(err, EngineError::InitFailed(_)));
    }
}
