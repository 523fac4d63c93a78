//! Regulation file output.
//!
//! One file per regulation, named after its display title, written into the
//! directory mirrored from the catalog. Keys keep document order and
//! non-ASCII text is written literally.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::config::{sanitize_segment, OutputFormat};
use crate::error::{HarvesterError, Result};
use crate::types::RegulationBody;

/// Serialize a body in the given format.
pub fn render(body: &RegulationBody, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let mut buf = Vec::new();
            let formatter = PrettyFormatter::with_indent(b"    ");
            let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
            body.serialize(&mut serializer)?;
            buf.push(b'\n');
            // serde_json only ever emits UTF-8
            Ok(String::from_utf8_lossy(&buf).into_owned())
        }
        OutputFormat::Yaml => Ok(format!("---\n{}", serde_yaml_ng::to_string(body)?)),
    }
}

/// Parse a persisted regulation file back into a body.
pub fn parse(content: &str, format: OutputFormat) -> Result<RegulationBody> {
    match format {
        OutputFormat::Json => Ok(serde_json::from_str(content)?),
        OutputFormat::Yaml => Ok(serde_yaml_ng::from_str(content)?),
    }
}

/// Path of the file a regulation is written to.
pub fn regulation_path(
    directory: &Path,
    regulation_title: &str,
    format: OutputFormat,
) -> Result<PathBuf> {
    let stem = sanitize_segment(regulation_title)?;
    Ok(directory.join(format!("{stem}.{}", format.extension())))
}

/// Write a regulation body to `directory/<title>.<ext>`.
///
/// Uses atomic write pattern: writes to temp file, syncs to disk, then renames.
/// An existing file of the same name is replaced.
///
/// # Returns
/// Path to the saved file
pub fn write_regulation(
    body: &RegulationBody,
    directory: &Path,
    regulation_title: &str,
    format: OutputFormat,
) -> Result<PathBuf> {
    let output_file = regulation_path(directory, regulation_title, format)?;
    let file_name = output_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_file = directory.join(format!(".{file_name}.tmp"));

    let content = render(body, format)?;
    write_atomic(&temp_file, &output_file, content.as_bytes())?;

    tracing::debug!(path = %output_file.display(), "Saved regulation");
    Ok(output_file)
}

/// Write `content` to `temp` then rename it over `target`.
pub(crate) fn write_atomic(temp: &Path, target: &Path, content: &[u8]) -> Result<()> {
    {
        let mut file = File::create(temp).map_err(|e| HarvesterError::storage(temp, e))?;
        file.write_all(content)
            .map_err(|e| HarvesterError::storage(temp, e))?;
        file.sync_all()
            .map_err(|e| HarvesterError::storage(temp, e))?;
    }

    // On Windows, rename fails if the destination already exists
    #[cfg(target_os = "windows")]
    if target.exists() {
        fs::remove_file(target).map_err(|e| HarvesterError::storage(target, e))?;
    }

    fs::rename(temp, target).map_err(|e| HarvesterError::storage(target, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Articles, BodyEntry, Chapter, ChapterEntry};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn sample_body() -> RegulationBody {
        let mut section = Articles::new();
        section.insert("第 2 條", "人民有依法律納稅之義務。".to_string());

        let mut chapter = Chapter::new();
        chapter.insert("第 1 條", ChapterEntry::Article("第一項\n第二項".to_string()));
        chapter.insert("第 一 節 通則", ChapterEntry::Section(section));

        let mut body = RegulationBody::new();
        body.entries
            .insert("第 一 章 總綱", BodyEntry::Chapter(chapter));
        body
    }

    #[test]
    fn test_render_json_is_literal_utf8_with_four_space_indent() {
        let json = render(&sample_body(), OutputFormat::Json).unwrap();
        assert!(json.contains("\"第 一 章 總綱\": {"));
        assert!(json.contains("\n    \"第 一 章 總綱\""));
        assert!(!json.contains("\\u"));
        assert!(json.ends_with("}\n"));
    }

    #[test]
    fn test_render_empty_body() {
        let json = render(&RegulationBody::new(), OutputFormat::Json).unwrap();
        assert_eq!(json, "{}\n");
    }

    #[test]
    fn test_round_trip_preserves_order() {
        let body = sample_body();
        for format in [OutputFormat::Json, OutputFormat::Yaml] {
            let content = render(&body, format).unwrap();
            let parsed = parse(&content, format).unwrap();
            assert_eq!(parsed, body, "round trip failed for {format:?}");
        }
    }

    #[test]
    fn test_write_regulation() {
        let temp = tempdir().unwrap();
        let path = write_regulation(&sample_body(), temp.path(), "中華民國憲法", OutputFormat::Json)
            .unwrap();

        assert_eq!(path, temp.path().join("中華民國憲法.json"));
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(parse(&content, OutputFormat::Json).unwrap(), sample_body());
        assert!(!temp.path().join(".中華民國憲法.json.tmp").exists());
    }

    #[test]
    fn test_write_regulation_overwrites() {
        let temp = tempdir().unwrap();
        write_regulation(&sample_body(), temp.path(), "民法", OutputFormat::Json).unwrap();
        let path =
            write_regulation(&RegulationBody::new(), temp.path(), "民法", OutputFormat::Json)
                .unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "{}\n");
    }

    #[test]
    fn test_write_regulation_sanitizes_title() {
        let temp = tempdir().unwrap();
        let path = write_regulation(
            &RegulationBody::new(),
            temp.path(),
            "工廠管理輔導法/施行細則",
            OutputFormat::Yaml,
        )
        .unwrap();
        assert_eq!(path, temp.path().join("工廠管理輔導法_施行細則.yaml"));
    }

    #[test]
    fn test_write_regulation_missing_directory() {
        let temp = tempdir().unwrap();
        let err = write_regulation(
            &RegulationBody::new(),
            &temp.path().join("missing"),
            "民法",
            OutputFormat::Json,
        )
        .unwrap_err();
        assert!(matches!(err, HarvesterError::Storage { .. }));
    }
}
