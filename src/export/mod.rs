//! Export of run results
//!
//! - intermediate artifacts as plain-text files
//! - the final report as a paginated PDF, only once a run has completed
//!
//! Files go to a [`FileSink`]; the MIME type is derived from the file name.

pub mod pdf;
pub mod sink;

pub use sink::{DirectorySink, FileSink, MemorySink, StoredFile};

use serde::Serialize;

use crate::error::{ClientError, Result};
use crate::layout::{DocumentLayoutEngine, DocumentSource};
use crate::workflow::{Phase, RunModel};

/// Summary of one written file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedFile {
    pub name: String,
    pub mime: String,
    pub size: usize,
}

#[derive(Default)]
pub struct Exporter {
    engine: DocumentLayoutEngine,
}

impl Exporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(engine: DocumentLayoutEngine) -> Self {
        Self { engine }
    }

    /// One text file per non-empty intermediate artifact
    pub fn export_artifacts(&self, model: &RunModel, sink: &dyn FileSink) -> Result<Vec<ExportedFile>> {
        let mut written = Vec::new();
        for (stem, text) in model.artifacts() {
            let name = format!("{}.txt", stem);
            written.push(write(sink, &name, text.as_bytes())?);
        }

        tracing::info!(
            kind = %model.kind(),
            files = written.len(),
            "[Exporter] Exported artifacts"
        );
        Ok(written)
    }

    /// Lay out the final report and write it as `<kind>-<topic-slug>.pdf`
    pub fn export_document(&self, model: &RunModel, sink: &dyn FileSink) -> Result<ExportedFile> {
        if model.phase != Phase::Completed {
            return Err(ClientError::Export(format!(
                "Run is {}, only completed runs can be exported as a document",
                model.phase.as_str()
            )));
        }

        let document = document_source(model);
        let pages = self.engine.layout(&document);
        let bytes = pdf::render_pdf(&pages, self.engine.geometry(), &document.title);
        let name = document_file_name(model);

        let file = write(sink, &name, &bytes)?;
        tracing::info!(
            kind = %model.kind(),
            pages = pages.len(),
            name = %file.name,
            "[Exporter] Exported document"
        );
        Ok(file)
    }
}

/// Title, topic, final text and sources of a run
pub fn document_source(model: &RunModel) -> DocumentSource {
    DocumentSource {
        title: model.kind().title().to_string(),
        topic: model.request.topic.clone(),
        body: model.final_text().unwrap_or_default(),
        sources: model.sources(),
    }
}

pub fn document_file_name(model: &RunModel) -> String {
    format!("{}-{}.pdf", model.kind().as_str(), topic_slug(&model.request.topic))
}

/// Whitespace collapsed to `-`, lower-cased, path separators removed
pub fn topic_slug(topic: &str) -> String {
    let slug = topic
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| !matches!(c, '/' | '\\') && !c.is_control())
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase();

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

fn write(sink: &dyn FileSink, name: &str, bytes: &[u8]) -> Result<ExportedFile> {
    let mime = mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    sink.write_file(name, &mime, bytes)?;
    Ok(ExportedFile {
        name: name.to_string(),
        mime,
        size: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{RunRequest, StepId, StepTracker, StreamEvent, WorkflowKind};
    use serde_json::json;

    fn completed_reflection() -> RunModel {
        let events = vec![
            StreamEvent::Start,
            StreamEvent::StepComplete {
                step: StepId::named("draft"),
                data: json!("A first draft."),
            },
            StreamEvent::StepComplete {
                step: StepId::named("reflection"),
                data: json!("Needs **sources**."),
            },
            StreamEvent::StepComplete {
                step: StepId::named("revised"),
                data: json!("# Revised\n\nThe **final** text."),
            },
            StreamEvent::Complete,
        ];
        StepTracker::replay(
            RunRequest::new(WorkflowKind::Reflection, "  AI   Regulation / EU "),
            &events,
        )
    }

    #[test]
    fn test_topic_slug() {
        assert_eq!(topic_slug("  AI   Regulation / EU "), "ai-regulation-eu");
        assert_eq!(topic_slug("a/b\\c d"), "abc-d");
        assert_eq!(topic_slug("   "), "untitled");
    }

    #[test]
    fn test_export_artifacts() {
        let sink = MemorySink::new();
        let files = Exporter::new()
            .export_artifacts(&completed_reflection(), &sink)
            .unwrap();

        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["draft.txt", "reflection.txt", "revised.txt"]);
        assert!(files.iter().all(|f| f.mime == "text/plain"));
        assert_eq!(sink.get("draft.txt").unwrap().bytes, b"A first draft.");
    }

    #[test]
    fn test_export_document_writes_pdf() {
        let sink = MemorySink::new();
        let file = Exporter::new()
            .export_document(&completed_reflection(), &sink)
            .unwrap();

        assert_eq!(file.name, "reflection-ai-regulation-eu.pdf");
        assert_eq!(file.mime, "application/pdf");
        let stored = sink.get(&file.name).unwrap();
        assert!(stored.bytes.starts_with(b"%PDF-"));
        assert_eq!(stored.bytes.len(), file.size);
    }

    #[test]
    fn test_export_document_requires_completed_run() {
        let sink = MemorySink::new();
        let mut model = completed_reflection();
        model.phase = Phase::Failed;

        assert!(Exporter::new().export_document(&model, &sink).is_err());
        assert!(sink.files().is_empty());
    }
}
