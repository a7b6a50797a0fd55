use snafu::Snafu;

/// Errors raised by the chat store, the event registry and prompt templates.
///
/// None of these are fatal. Event handlers turn them into block errors or
/// dropped events, and the CLI reports them as messages.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChatError {
    #[snafu(display("unregistered event type '{event_type}'"))]
    UnregisteredEventType { event_type: String },

    #[snafu(display("message '{message_id}' was not found"))]
    MessageNotFound { message_id: String },

    #[snafu(display("block '{block_id}' was not found"))]
    BlockNotFound { block_id: String },

    #[snafu(display("block '{block_id}' already exists"))]
    DuplicateBlock { block_id: String },

    #[snafu(display("message '{message_id}' is finalized and can no longer change"))]
    MessageFinalized { message_id: String },

    #[snafu(display("message '{message_id}' is locked while its blocks are streaming"))]
    MessageLocked { message_id: String },

    #[snafu(display("block '{block_id}' is locked, it already finished with status {status}"))]
    BlockLocked { block_id: String, status: String },

    #[snafu(display("a response is already streaming for message '{message_id}'"))]
    StreamInProgress { message_id: String },

    #[snafu(display("session '{session_id}' is closed"))]
    SessionClosed { session_id: String },

    #[snafu(display("malformed event: {source}"))]
    MalformedEvent { source: serde_json::Error },

    #[snafu(display(
        "template '{template}' is missing required fields: {}",
        fields.join(", ")
    ))]
    MissingTemplateFields {
        template: String,
        fields: Vec<String>,
    },

    #[snafu(display("invalid template: {details}"))]
    InvalidTemplate { details: String },
}

pub type ChatResult<T> = std::result::Result<T, ChatError>;
