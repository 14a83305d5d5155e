//! Input DTOs and schema-bearing types
//!
//! Defines the parameter structures of every MCP tool. Each type derives
//! `JsonSchema` so the advertised tool schema matches what `serde` accepts;
//! bounds that JSON Schema types cannot express are checked in
//! [`crate::validation`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Email address with optional display name
///
/// Used both as tool input and as the JMAP `EmailAddress` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EmailAddress {
    /// Display name (e.g., `Jane Doe`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Mailbox address (e.g., `jane@example.com`)
    pub email: String,
}

/// Email properties that may be requested from `get_emails`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum EmailProperty {
    Id,
    BlobId,
    ThreadId,
    MailboxIds,
    Keywords,
    Size,
    ReceivedAt,
    MessageId,
    InReplyTo,
    References,
    Sender,
    From,
    To,
    Cc,
    Bcc,
    ReplyTo,
    Subject,
    SentAt,
    HasAttachment,
    Preview,
    BodyStructure,
    BodyValues,
    TextBody,
    HtmlBody,
    Attachments,
    Headers,
}

impl EmailProperty {
    /// JMAP property name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::BlobId => "blobId",
            Self::ThreadId => "threadId",
            Self::MailboxIds => "mailboxIds",
            Self::Keywords => "keywords",
            Self::Size => "size",
            Self::ReceivedAt => "receivedAt",
            Self::MessageId => "messageId",
            Self::InReplyTo => "inReplyTo",
            Self::References => "references",
            Self::Sender => "sender",
            Self::From => "from",
            Self::To => "to",
            Self::Cc => "cc",
            Self::Bcc => "bcc",
            Self::ReplyTo => "replyTo",
            Self::Subject => "subject",
            Self::SentAt => "sentAt",
            Self::HasAttachment => "hasAttachment",
            Self::Preview => "preview",
            Self::BodyStructure => "bodyStructure",
            Self::BodyValues => "bodyValues",
            Self::TextBody => "textBody",
            Self::HtmlBody => "htmlBody",
            Self::Attachments => "attachments",
            Self::Headers => "headers",
        }
    }
}

/// Input: search emails
///
/// Used by `search_emails`. Every filter field is optional; only supplied
/// fields become filter conditions.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchEmailsInput {
    /// Free-text search across headers and body
    pub query: Option<String>,
    /// Match the From header
    pub from: Option<String>,
    /// Match the To header
    pub to: Option<String>,
    /// Match the Cc header
    pub cc: Option<String>,
    /// Match the Bcc header
    pub bcc: Option<String>,
    /// Match the Subject header
    pub subject: Option<String>,
    /// Match text in the message body
    pub body: Option<String>,
    /// Restrict to emails in this mailbox id
    pub in_mailbox: Option<String>,
    /// Require this keyword (e.g., `$seen`, `$flagged`)
    pub has_keyword: Option<String>,
    /// Exclude emails with this keyword
    pub not_keyword: Option<String>,
    /// Received before this ISO-8601 datetime (e.g., `2025-01-31T00:00:00Z`)
    pub before: Option<String>,
    /// Received at or after this ISO-8601 datetime
    pub after: Option<String>,
    /// Minimum size in bytes
    pub min_size: Option<u64>,
    /// Maximum size in bytes
    pub max_size: Option<u64>,
    /// Match on presence of attachments
    pub has_attachment: Option<bool>,
    /// Every email in the thread has this keyword
    pub all_in_thread_have_keyword: Option<String>,
    /// At least one email in the thread has this keyword
    pub some_in_thread_have_keyword: Option<String>,
    /// No email in the thread has this keyword
    pub none_in_thread_have_keyword: Option<String>,
    /// Maximum ids to return (1..100, default 50)
    #[serde(default = "default_search_limit")]
    pub limit: u32,
    /// Zero-based index of the first result (default 0)
    #[serde(default)]
    pub position: u64,
}

/// Input: get emails by id
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetEmailsInput {
    /// Email ids to fetch (1..50)
    pub ids: Vec<String>,
    /// Properties to return; server defaults when omitted
    pub properties: Option<Vec<EmailProperty>>,
    /// Populate `bodyValues` for text/plain body parts
    pub fetch_text_body_values: Option<bool>,
    /// Populate `bodyValues` for text/html body parts
    #[serde(rename = "fetchHTMLBodyValues")]
    pub fetch_html_body_values: Option<bool>,
    /// Truncate each body value to this many bytes
    pub max_body_value_bytes: Option<u64>,
}

/// Input: list mailboxes
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetMailboxesInput {
    /// Only list children of this mailbox id
    pub parent_id: Option<String>,
    /// Maximum mailboxes to return (1..200, default 100)
    #[serde(default = "default_mailbox_limit")]
    pub limit: u32,
    /// Zero-based index of the first result (default 0)
    #[serde(default)]
    pub position: u64,
}

/// Input: get threads by id
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetThreadsInput {
    /// Thread ids to fetch (1..20)
    pub ids: Vec<String>,
}

/// Input: set or clear the seen/flagged keywords
///
/// Keywords that are not supplied are left untouched.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkEmailsInput {
    /// Email ids to update (1..100)
    pub ids: Vec<String>,
    /// `true` marks read, `false` marks unread
    pub seen: Option<bool>,
    /// `true` flags, `false` unflags
    pub flagged: Option<bool>,
}

/// Input: move emails into a single mailbox
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MoveEmailsInput {
    /// Email ids to move (1..100)
    pub ids: Vec<String>,
    /// Target mailbox id; replaces all existing mailbox memberships
    pub mailbox_id: String,
}

/// Input: permanently delete emails
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteEmailsInput {
    /// Email ids to destroy (1..100)
    pub ids: Vec<String>,
}

/// Input: compose and send a new email
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailInput {
    /// Recipients (at least one)
    pub to: Vec<EmailAddress>,
    /// Carbon-copy recipients
    pub cc: Option<Vec<EmailAddress>>,
    /// Blind carbon-copy recipients
    pub bcc: Option<Vec<EmailAddress>>,
    /// Subject line
    pub subject: String,
    /// Plain-text body
    pub text_body: Option<String>,
    /// HTML body
    pub html_body: Option<String>,
    /// Sender address; defaults to the sending identity's address
    pub from: Option<EmailAddress>,
    /// Identity to send with; resolved from `from` or the first identity when omitted
    pub identity_id: Option<String>,
}

/// Input: reply to an existing email
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplyToEmailInput {
    /// Id of the email being replied to
    pub email_id: String,
    /// Also address the original To and Cc recipients
    #[serde(default)]
    pub reply_all: bool,
    /// Subject override; defaults to `Re: <original subject>`
    pub subject: Option<String>,
    /// Plain-text body
    pub text_body: Option<String>,
    /// HTML body
    pub html_body: Option<String>,
    /// Sender address; defaults to the sending identity's address
    pub from: Option<EmailAddress>,
    /// Identity to send with; resolved from `from` or the first identity when omitted
    pub identity_id: Option<String>,
}

/// Default value for `limit` in `search_emails`
fn default_search_limit() -> u32 {
    50
}

/// Default value for `limit` in `get_mailboxes`
fn default_mailbox_limit() -> u32 {
    100
}
