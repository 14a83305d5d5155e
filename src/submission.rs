//! Submission tools: compose, send, and reply
//!
//! Sending is two phases. Phase 1 creates a `$draft` email with `Email/set`;
//! phase 2 submits it with `EmailSubmission/set` and clears `$draft` on
//! success. Phase 2 runs only when phase 1 yields an id, and a phase-2
//! failure leaves the draft in place.

use std::collections::BTreeMap;
use std::time::Instant;

use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, ErrorData};
use rmcp::{tool, tool_router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::errors::{AppError, AppResult, format_reason};
use crate::filter::MailboxFilter;
use crate::jmap::{
    GetArgs, GetResponse, QueryArgs, QueryResponse, SetArgs, SetResponse, USING_MAIL,
    USING_SUBMISSION,
};
use crate::models::{EmailAddress, ReplyToEmailInput, SendEmailInput};
use crate::server::{JmapMcpServer, finalize_tool};
use crate::validation::Validate;

/// Creation id of the draft within `Email/set`
const DRAFT_CREATION_ID: &str = "draft";
/// Creation id of the submission within `EmailSubmission/set`
const SUBMISSION_CREATION_ID: &str = "submission";
/// Subject prefix added to replies
const REPLY_PREFIX: &str = "Re: ";
/// Properties fetched from the email being replied to
const ORIGINAL_PROPERTIES: &[&str] = &["id", "subject", "from", "to", "cc", "replyTo", "references"];

#[tool_router(router = submission_router, vis = "pub(crate)")]
impl JmapMcpServer {
    /// Tool: Compose and send a new email
    #[tool(
        name = "send_email",
        description = "Compose and send a new email. Requires textBody and/or htmlBody. The message is created as a draft in the Drafts mailbox, then submitted."
    )]
    async fn send_email(
        &self,
        Parameters(input): Parameters<SendEmailInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            "send_email",
            "Error sending email",
            started,
            self.send_email_impl(input).await,
        )
    }

    /// Tool: Reply to an existing email
    ///
    /// Addresses the reply from the original's Reply-To or From, and with
    /// `replyAll` also copies the original To and Cc recipients.
    #[tool(
        name = "reply_to_email",
        description = "Reply to an email by id. Requires textBody and/or htmlBody. Subject defaults to 'Re: <original subject>'; replyAll also copies the original To and Cc recipients."
    )]
    async fn reply_to_email(
        &self,
        Parameters(input): Parameters<ReplyToEmailInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            "reply_to_email",
            "Error replying to email",
            started,
            self.reply_to_email_impl(input).await,
        )
    }
}

/// Sending identity (subset of the JMAP `Identity` object)
#[derive(Debug, Clone, Deserialize)]
struct Identity {
    id: String,
    #[serde(default)]
    name: Option<String>,
    email: String,
}

/// Fields of the email being replied to
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OriginalEmail {
    id: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    from: Option<Vec<EmailAddress>>,
    #[serde(default)]
    to: Option<Vec<EmailAddress>>,
    #[serde(default)]
    cc: Option<Vec<EmailAddress>>,
    #[serde(default)]
    reply_to: Option<Vec<EmailAddress>>,
    #[serde(default)]
    references: Option<Vec<String>>,
}

/// Inline body content of a draft
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct BodyValue {
    value: String,
    is_truncated: bool,
    is_encoding_problem: bool,
}

impl BodyValue {
    fn new(value: String) -> Self {
        Self {
            value,
            is_truncated: false,
            is_encoding_problem: false,
        }
    }
}

/// Body part referencing a `bodyValues` entry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct BodyPart {
    part_id: &'static str,
    #[serde(rename = "type")]
    content_type: &'static str,
}

/// Email object created by phase 1
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    mailbox_ids: Option<BTreeMap<String, bool>>,
    keywords: BTreeMap<&'static str, bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<Vec<EmailAddress>>,
    to: Vec<EmailAddress>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cc: Vec<EmailAddress>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    bcc: Vec<EmailAddress>,
    subject: String,
    body_values: BTreeMap<&'static str, BodyValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    text_body: Vec<BodyPart>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    html_body: Vec<BodyPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    in_reply_to: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    references: Option<Vec<String>>,
}

/// Addressing and content shared by new messages and replies
struct Composition {
    to: Vec<EmailAddress>,
    cc: Vec<EmailAddress>,
    bcc: Vec<EmailAddress>,
    subject: String,
    text_body: Option<String>,
    html_body: Option<String>,
    from: Option<EmailAddress>,
    identity_id: Option<String>,
    in_reply_to: Option<Vec<String>>,
    references: Option<Vec<String>>,
}

/// Outcome of a create-then-submit sequence
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendResultData {
    email_id: String,
    submission_id: Option<String>,
    sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    submission_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_all: Option<bool>,
}

impl JmapMcpServer {
    async fn send_email_impl(&self, input: SendEmailInput) -> AppResult<Value> {
        require_body(input.text_body.as_deref(), input.html_body.as_deref())?;
        input.validate()?;

        let composition = Composition {
            to: input.to,
            cc: input.cc.unwrap_or_default(),
            bcc: input.bcc.unwrap_or_default(),
            subject: input.subject,
            text_body: input.text_body,
            html_body: input.html_body,
            from: input.from,
            identity_id: input.identity_id,
            in_reply_to: None,
            references: None,
        };
        let result = self.create_and_submit(composition).await?;
        Ok(serde_json::to_value(result)?)
    }

    async fn reply_to_email_impl(&self, input: ReplyToEmailInput) -> AppResult<Value> {
        require_body(input.text_body.as_deref(), input.html_body.as_deref())?;
        input.validate()?;

        let original = self.fetch_original(&input.email_id).await?;
        let (to, cc) = reply_recipients(&original, input.reply_all);
        let composition = Composition {
            to,
            cc,
            bcc: Vec::new(),
            subject: reply_subject(input.subject.as_deref(), original.subject.as_deref()),
            text_body: input.text_body,
            html_body: input.html_body,
            from: input.from,
            identity_id: input.identity_id,
            in_reply_to: Some(vec![original.id.clone()]),
            references: Some(reply_references(
                original.references.as_deref(),
                &original.id,
            )),
        };
        let mut result = self.create_and_submit(composition).await?;
        result.reply_all = Some(input.reply_all);
        Ok(serde_json::to_value(result)?)
    }

    async fn fetch_original(&self, email_id: &str) -> AppResult<OriginalEmail> {
        let args = GetArgs {
            ids: Some(vec![email_id.to_owned()]),
            properties: Some(ORIGINAL_PROPERTIES.iter().map(|p| (*p).to_owned()).collect()),
            ..Default::default()
        };
        let result: GetResponse<OriginalEmail> =
            self.client.call(USING_MAIL, "Email/get", args).await?;
        result
            .list
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("email {email_id}")))
    }

    /// Run both phases for a composed message
    async fn create_and_submit(&self, composition: Composition) -> AppResult<SendResultData> {
        let drafts_mailbox = self.drafts_mailbox_id().await?;
        let (identity_id, default_from) = self
            .resolve_identity(
                composition.identity_id.as_deref(),
                composition.from.as_ref(),
            )
            .await?;
        let from = composition.from.clone().or(default_from);
        let draft = build_draft(composition, from, drafts_mailbox);

        let email_id = self.create_draft(draft).await?;
        info!(email_id = %email_id, "draft created");

        let (submission_id, submission_error) = self
            .submit(&email_id, &identity_id)
            .await
            .map_err(|e| {
                AppError::Remote(format!(
                    "draft {email_id} was created but submission failed: {e}"
                ))
            })?;
        if let Some(reason) = &submission_error {
            warn!(email_id = %email_id, reason = %reason, "submission rejected; draft kept");
        }

        Ok(SendResultData {
            sent: submission_id.is_some(),
            email_id,
            submission_id,
            submission_error,
            reply_all: None,
        })
    }

    /// Id of the account's `drafts`-role mailbox, if any
    async fn drafts_mailbox_id(&self) -> AppResult<Option<String>> {
        let args = QueryArgs {
            filter: Some(MailboxFilter {
                parent_id: None,
                role: Some("drafts".to_owned()),
            }),
            sort: Vec::new(),
            position: 0,
            limit: 1,
            calculate_total: false,
        };
        let result: QueryResponse = self.client.call(USING_MAIL, "Mailbox/query", args).await?;
        Ok(result.ids.into_iter().next())
    }

    /// Pick the sending identity and the `from` address it implies
    ///
    /// An explicit identity id is used as is. Otherwise the identity whose
    /// address matches `from` wins, falling back to the first identity.
    async fn resolve_identity(
        &self,
        identity_id: Option<&str>,
        from: Option<&EmailAddress>,
    ) -> AppResult<(String, Option<EmailAddress>)> {
        if let Some(id) = identity_id {
            return Ok((id.to_owned(), None));
        }
        let result: GetResponse<Identity> = self
            .client
            .call(USING_SUBMISSION, "Identity/get", GetArgs::default())
            .await?;
        let identity = choose_identity(result.list, from).ok_or_else(|| {
            AppError::Precondition("no sending identity is configured for this account".to_owned())
        })?;
        let address = EmailAddress {
            name: identity.name.filter(|n| !n.is_empty()),
            email: identity.email,
        };
        Ok((identity.id, Some(address)))
    }

    /// Phase 1: create the draft and return its server id
    async fn create_draft(&self, draft: EmailDraft) -> AppResult<String> {
        let mut create = Map::new();
        create.insert(DRAFT_CREATION_ID.to_owned(), serde_json::to_value(draft)?);
        let args = SetArgs {
            create: Some(create),
            ..Default::default()
        };
        let result: SetResponse = self.client.call(USING_MAIL, "Email/set", args).await?;
        if let Some(reason) = result
            .not_created
            .as_ref()
            .and_then(|m| m.get(DRAFT_CREATION_ID))
        {
            return Err(AppError::Remote(format!(
                "failed to create email: {}",
                format_reason(reason)
            )));
        }
        created_id(&result, DRAFT_CREATION_ID)
            .ok_or_else(|| AppError::Internal("Email/set did not report the created draft".to_owned()))
    }

    /// Phase 2: submit the draft
    ///
    /// Returns the submission id, or the server's rejection reason.
    async fn submit(
        &self,
        email_id: &str,
        identity_id: &str,
    ) -> AppResult<(Option<String>, Option<String>)> {
        let mut create = Map::new();
        create.insert(
            SUBMISSION_CREATION_ID.to_owned(),
            json!({ "emailId": email_id, "identityId": identity_id }),
        );
        let mut on_success = Map::new();
        on_success.insert(
            format!("#{SUBMISSION_CREATION_ID}"),
            json!({ "keywords/$draft": null }),
        );
        let args = SetArgs {
            create: Some(create),
            on_success_update_email: Some(on_success),
            ..Default::default()
        };
        let result: SetResponse = self
            .client
            .call(USING_SUBMISSION, "EmailSubmission/set", args)
            .await?;

        if let Some(id) = created_id(&result, SUBMISSION_CREATION_ID) {
            return Ok((Some(id), None));
        }
        let reason = result
            .not_created
            .as_ref()
            .and_then(|m| m.get(SUBMISSION_CREATION_ID))
            .map_or_else(|| "submission was not created".to_owned(), format_reason);
        Ok((None, Some(reason)))
    }
}

/// Body content, with an empty string counting as absent
fn body_content(body: Option<String>) -> Option<String> {
    body.filter(|b| !b.is_empty())
}

/// Reject a message with neither a text nor an HTML body
///
/// Empty strings count as missing.
fn require_body(text_body: Option<&str>, html_body: Option<&str>) -> AppResult<()> {
    let present = |body: Option<&str>| body.is_some_and(|b| !b.is_empty());
    if !present(text_body) && !present(html_body) {
        return Err(AppError::Precondition(
            "either textBody or htmlBody is required".to_owned(),
        ));
    }
    Ok(())
}

/// Server id assigned to a creation id in a `*/set` response
fn created_id(result: &SetResponse, creation_id: &str) -> Option<String> {
    result
        .created
        .as_ref()?
        .get(creation_id)?
        .get("id")?
        .as_str()
        .map(str::to_owned)
}

fn choose_identity(identities: Vec<Identity>, from: Option<&EmailAddress>) -> Option<Identity> {
    let index = from
        .and_then(|f| {
            identities
                .iter()
                .position(|i| i.email.eq_ignore_ascii_case(&f.email))
        })
        .unwrap_or(0);
    identities.into_iter().nth(index)
}

fn build_draft(
    composition: Composition,
    from: Option<EmailAddress>,
    drafts_mailbox: Option<String>,
) -> EmailDraft {
    let mut body_values = BTreeMap::new();
    let mut text_body = Vec::new();
    let mut html_body = Vec::new();
    if let Some(text) = body_content(composition.text_body) {
        body_values.insert("text", BodyValue::new(text));
        text_body.push(BodyPart {
            part_id: "text",
            content_type: "text/plain",
        });
    }
    if let Some(html) = body_content(composition.html_body) {
        body_values.insert("html", BodyValue::new(html));
        html_body.push(BodyPart {
            part_id: "html",
            content_type: "text/html",
        });
    }

    EmailDraft {
        mailbox_ids: drafts_mailbox.map(|id| BTreeMap::from([(id, true)])),
        keywords: BTreeMap::from([("$draft", true)]),
        from: from.map(|f| vec![f]),
        to: composition.to,
        cc: composition.cc,
        bcc: composition.bcc,
        subject: composition.subject,
        body_values,
        text_body,
        html_body,
        in_reply_to: composition.in_reply_to,
        references: composition.references,
    }
}

/// Compute `(to, cc)` for a reply
///
/// `to` is the original Reply-To when non-empty, else its From. With
/// `reply_all`, the original To and Cc are appended to `cc` as is.
fn reply_recipients(
    original: &OriginalEmail,
    reply_all: bool,
) -> (Vec<EmailAddress>, Vec<EmailAddress>) {
    let to = match &original.reply_to {
        Some(reply_to) if !reply_to.is_empty() => reply_to.clone(),
        _ => original.from.clone().unwrap_or_default(),
    };
    let mut cc = Vec::new();
    if reply_all {
        cc.extend(original.to.iter().flatten().cloned());
        cc.extend(original.cc.iter().flatten().cloned());
    }
    (to, cc)
}

fn reply_subject(requested: Option<&str>, original: Option<&str>) -> String {
    if let Some(subject) = requested {
        return subject.to_owned();
    }
    let original = original.unwrap_or_default();
    if original.starts_with(REPLY_PREFIX) {
        original.to_owned()
    } else {
        format!("{REPLY_PREFIX}{original}")
    }
}

/// Extend the original's reference chain with its own id
fn reply_references(references: Option<&[String]>, original_id: &str) -> Vec<String> {
    let mut chain = references.map(<[String]>::to_vec).unwrap_or_default();
    chain.push(original_id.to_owned());
    chain
}
