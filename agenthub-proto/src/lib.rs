// AgentHub shared proto types
// Generated from proto/a2a.proto and proto/hub.proto (package agenthub.v1).

mod v1 {
    tonic::include_proto!("agenthub.v1");
}

pub use v1::*;

impl TaskState {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }
}

impl Part {
    /// Text part constructor.
    pub fn text(text: impl Into<String>) -> Self {
        Part {
            content: Some(part::Content::Text(text.into())),
        }
    }

    /// Structured data part constructor.
    pub fn data(data: prost_types::Struct, description: impl Into<String>) -> Self {
        Part {
            content: Some(part::Content::Data(DataPart {
                data: Some(data),
                description: description.into(),
            })),
        }
    }

    /// Returns the text content, if this is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            Some(part::Content::Text(t)) => Some(t.as_str()),
            _ => None,
        }
    }

    /// True when the variant carries no usable content.
    pub fn is_empty(&self) -> bool {
        match &self.content {
            None => true,
            Some(part::Content::Text(t)) => t.is_empty(),
            Some(part::Content::Data(d)) => d.data.is_none(),
            Some(part::Content::File(f)) => f.file_id.is_empty(),
        }
    }
}

impl Message {
    /// Concatenated text of all text parts, for logging and fallbacks.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| p.as_text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
