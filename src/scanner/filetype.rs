//! File classification for scan routing.
//!
//! Decides whether a path must be unwrapped as a compound container before
//! matching or matched raw. The decision is keyed on a content-type guess
//! from the filename alone; the file is never opened here.

use std::path::Path;

/// Marker present in every Office-Open-XML container content type.
const OOXML_MARKER: &str = "openxmlformats-officedocument";

/// How a file's content should be routed to the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileClassification {
    /// Match the file's bytes directly
    RawBinary,
    /// Unwrap as a zip-based Office container and match inner entries
    CompoundDocument,
}

impl std::fmt::Display for FileClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileClassification::RawBinary => write!(f, "raw binary"),
            FileClassification::CompoundDocument => write!(f, "compound document"),
        }
    }
}

/// Extension-keyed content-type classifier.
#[derive(Debug, Clone, Default)]
pub struct FileTypeClassifier;

impl FileTypeClassifier {
    /// Create a new classifier.
    pub fn new() -> Self {
        Self
    }

    /// Classify a path for scan routing.
    ///
    /// Any guessed content type carrying the Office-Open-XML container
    /// marker classifies as [`FileClassification::CompoundDocument`];
    /// everything else, including unresolvable types, is raw binary.
    pub fn classify(&self, path: &Path) -> FileClassification {
        match Self::guess_content_type(path) {
            Some(mime) if mime.contains(OOXML_MARKER) => FileClassification::CompoundDocument,
            _ => FileClassification::RawBinary,
        }
    }

    /// Guess a content type from the file extension.
    pub fn guess_content_type(path: &Path) -> Option<&'static str> {
        let ext = path.extension()?.to_str()?.to_lowercase();

        let mime = match ext.as_str() {
            "docx" | "docm" => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            "xlsx" | "xlsm" => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            "pptx" | "pptm" => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            "doc" => "application/msword",
            "xls" => "application/vnd.ms-excel",
            "ppt" => "application/vnd.ms-powerpoint",
            "zip" => "application/zip",
            "jar" => "application/java-archive",
            "pdf" => "application/pdf",
            "exe" | "dll" | "sys" => "application/vnd.microsoft.portable-executable",
            "txt" | "log" => "text/plain",
            "html" | "htm" => "text/html",
            "xml" => "application/xml",
            "js" => "text/javascript",
            "ps1" => "application/x-powershell",
            "bat" | "cmd" => "application/x-bat",
            _ => return None,
        };

        Some(mime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_office_xml_is_compound() {
        let classifier = FileTypeClassifier::new();
        for name in ["report.docx", "sheet.xlsx", "deck.pptx", "macro.docm"] {
            assert_eq!(
                classifier.classify(Path::new(name)),
                FileClassification::CompoundDocument,
                "{} should be a compound document",
                name
            );
        }
    }

    #[test]
    fn test_everything_else_is_raw() {
        let classifier = FileTypeClassifier::new();
        for name in ["tool.exe", "notes.txt", "archive.zip", "legacy.doc", "data.pdf"] {
            assert_eq!(
                classifier.classify(Path::new(name)),
                FileClassification::RawBinary,
                "{} should be raw binary",
                name
            );
        }
    }

    #[test]
    fn test_unknown_extension_is_raw() {
        let classifier = FileTypeClassifier::new();
        assert_eq!(
            classifier.classify(Path::new("blob.qqq")),
            FileClassification::RawBinary
        );
        assert_eq!(
            classifier.classify(Path::new("no_extension")),
            FileClassification::RawBinary
        );
    }

    #[test]
    fn test_case_insensitive_extension() {
        let classifier = FileTypeClassifier::new();
        assert_eq!(
            classifier.classify(Path::new("REPORT.DOCX")),
            FileClassification::CompoundDocument
        );
    }
}
