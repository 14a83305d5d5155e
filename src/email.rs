//! Email, mailbox, and thread tool handlers
//!
//! Read tools (search, get emails, list mailboxes, get threads) and the
//! mutating email tools (mark, move, delete). Each handler validates its
//! input, issues its JMAP call(s), and reshapes the response into JSON.

use std::time::Instant;

use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, ErrorData};
use rmcp::{tool, tool_router};
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::errors::AppResult;
use crate::filter::{build_email_filter, build_mailbox_filter};
use crate::jmap::{
    Comparator, GetArgs, GetResponse, QueryArgs, QueryResponse, SetArgs, SetResponse, USING_MAIL,
};
use crate::models::{
    DeleteEmailsInput, GetEmailsInput, GetMailboxesInput, GetThreadsInput, MarkEmailsInput,
    MoveEmailsInput, SearchEmailsInput,
};
use crate::pagination::PageInfo;
use crate::server::{JmapMcpServer, finalize_tool};
use crate::validation::Validate;

/// Read tools, registered unconditionally
#[tool_router(router = email_read_router, vis = "pub(crate)")]
impl JmapMcpServer {
    /// Tool: Search emails
    ///
    /// Runs one `Email/query` sorted newest-received first and returns the
    /// page of ids with pagination metadata.
    #[tool(
        name = "search_emails",
        description = "Search emails with optional filters (text, from, to, subject, mailbox, keywords, date range). Returns email ids newest first with pagination metadata; use get_emails to read them."
    )]
    async fn search_emails(
        &self,
        Parameters(input): Parameters<SearchEmailsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            "search_emails",
            "Error searching emails",
            started,
            self.search_emails_impl(input).await,
        )
    }

    /// Tool: Get emails by id
    #[tool(
        name = "get_emails",
        description = "Get emails by id, optionally limited to specific properties. Reports ids that were not found."
    )]
    async fn get_emails(
        &self,
        Parameters(input): Parameters<GetEmailsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            "get_emails",
            "Error getting emails",
            started,
            self.get_emails_impl(input).await,
        )
    }

    /// Tool: List mailboxes
    ///
    /// Queries mailbox ids in sort order, then fetches the full records.
    #[tool(
        name = "get_mailboxes",
        description = "List mailboxes (folders) in sort order, optionally under a parent mailbox, with pagination metadata."
    )]
    async fn get_mailboxes(
        &self,
        Parameters(input): Parameters<GetMailboxesInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            "get_mailboxes",
            "Error getting mailboxes",
            started,
            self.get_mailboxes_impl(input).await,
        )
    }

    /// Tool: Get threads by id
    #[tool(
        name = "get_threads",
        description = "Get threads by id, including the email ids in each thread. Reports ids that were not found."
    )]
    async fn get_threads(
        &self,
        Parameters(input): Parameters<GetThreadsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            "get_threads",
            "Error getting threads",
            started,
            self.get_threads_impl(input).await,
        )
    }
}

/// Mutating tools, registered only when the server is writable
#[tool_router(router = email_write_router, vis = "pub(crate)")]
impl JmapMcpServer {
    /// Tool: Set or clear seen/flagged keywords
    ///
    /// Only the keywords supplied are changed on each email.
    #[tool(
        name = "mark_emails",
        description = "Mark emails read/unread (seen) and/or flagged/unflagged. Keywords not supplied are left unchanged."
    )]
    async fn mark_emails(
        &self,
        Parameters(input): Parameters<MarkEmailsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            "mark_emails",
            "Error marking emails",
            started,
            self.mark_emails_impl(input).await,
        )
    }

    /// Tool: Move emails to a mailbox
    #[tool(
        name = "move_emails",
        description = "Move emails into a single mailbox, replacing their current mailbox membership."
    )]
    async fn move_emails(
        &self,
        Parameters(input): Parameters<MoveEmailsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            "move_emails",
            "Error moving emails",
            started,
            self.move_emails_impl(input).await,
        )
    }

    /// Tool: Permanently delete emails
    #[tool(
        name = "delete_emails",
        description = "Permanently delete emails. This cannot be undone; move to Trash instead for a recoverable delete."
    )]
    async fn delete_emails(
        &self,
        Parameters(input): Parameters<DeleteEmailsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            "delete_emails",
            "Error deleting emails",
            started,
            self.delete_emails_impl(input).await,
        )
    }
}

/// Search result data structure
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResultData {
    ids: Vec<String>,
    #[serde(flatten)]
    page: PageInfo,
}

/// Mailbox listing data structure
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MailboxListData {
    mailboxes: Vec<Value>,
    #[serde(flatten)]
    page: PageInfo,
}

/// Tool implementation methods
///
/// Private methods handle the actual business logic for each tool, separated
/// from the public `#[tool]` methods that handle response formatting.
impl JmapMcpServer {
    async fn search_emails_impl(&self, input: SearchEmailsInput) -> AppResult<Value> {
        input.validate()?;
        let args = QueryArgs {
            filter: build_email_filter(&input),
            sort: vec![Comparator {
                property: "receivedAt",
                is_ascending: false,
            }],
            position: input.position,
            limit: input.limit,
            calculate_total: true,
        };
        let result: QueryResponse = self.client.call(USING_MAIL, "Email/query", args).await?;
        let page = PageInfo::from_query(&result);
        Ok(serde_json::to_value(SearchResultData {
            ids: result.ids,
            page,
        })?)
    }

    async fn get_emails_impl(&self, input: GetEmailsInput) -> AppResult<Value> {
        input.validate()?;
        let mut extra = Map::new();
        if let Some(v) = input.fetch_text_body_values {
            extra.insert("fetchTextBodyValues".to_owned(), Value::Bool(v));
        }
        if let Some(v) = input.fetch_html_body_values {
            extra.insert("fetchHTMLBodyValues".to_owned(), Value::Bool(v));
        }
        if let Some(v) = input.max_body_value_bytes {
            extra.insert("maxBodyValueBytes".to_owned(), Value::from(v));
        }
        let args = GetArgs {
            ids: Some(input.ids),
            properties: input
                .properties
                .map(|props| props.iter().map(|p| p.as_str().to_owned()).collect()),
            extra,
        };
        let result: GetResponse<Value> = self.client.call(USING_MAIL, "Email/get", args).await?;
        Ok(json!({
            "emails": result.list,
            "notFound": result.not_found.unwrap_or_default(),
        }))
    }

    async fn get_mailboxes_impl(&self, input: GetMailboxesInput) -> AppResult<Value> {
        input.validate()?;
        let query = QueryArgs {
            filter: build_mailbox_filter(input.parent_id.as_deref()),
            sort: vec![Comparator {
                property: "sortOrder",
                is_ascending: true,
            }],
            position: input.position,
            limit: input.limit,
            calculate_total: true,
        };
        let result: QueryResponse = self
            .client
            .call(USING_MAIL, "Mailbox/query", query)
            .await?;
        let page = PageInfo::from_query(&result);

        // Nothing to fetch for an empty page.
        let mailboxes = if result.ids.is_empty() {
            Vec::new()
        } else {
            let fetched: GetResponse<Value> = self
                .client
                .call(
                    USING_MAIL,
                    "Mailbox/get",
                    GetArgs {
                        ids: Some(result.ids),
                        ..Default::default()
                    },
                )
                .await?;
            fetched.list
        };

        Ok(serde_json::to_value(MailboxListData { mailboxes, page })?)
    }

    async fn get_threads_impl(&self, input: GetThreadsInput) -> AppResult<Value> {
        input.validate()?;
        let result: GetResponse<Value> = self
            .client
            .call(
                USING_MAIL,
                "Thread/get",
                GetArgs {
                    ids: Some(input.ids),
                    ..Default::default()
                },
            )
            .await?;
        Ok(json!({
            "threads": result.list,
            "notFound": result.not_found.unwrap_or_default(),
        }))
    }

    async fn mark_emails_impl(&self, input: MarkEmailsInput) -> AppResult<Value> {
        input.validate()?;
        let patch = keyword_patch(input.seen, input.flagged);
        let result = self.update_each(&input.ids, &patch).await?;
        let updated = result
            .updated
            .map(|m| m.into_iter().map(|(id, _)| id).collect::<Vec<_>>())
            .unwrap_or_default();
        Ok(json!({
            "updated": updated,
            "notUpdated": result.not_updated.unwrap_or_default(),
        }))
    }

    async fn move_emails_impl(&self, input: MoveEmailsInput) -> AppResult<Value> {
        input.validate()?;
        let patch = mailbox_patch(&input.mailbox_id);
        let result = self.update_each(&input.ids, &patch).await?;
        Ok(json!({
            "updated": result.updated.unwrap_or_default(),
            "notUpdated": result.not_updated.unwrap_or_default(),
        }))
    }

    async fn delete_emails_impl(&self, input: DeleteEmailsInput) -> AppResult<Value> {
        input.validate()?;
        let args = SetArgs {
            destroy: Some(input.ids),
            ..Default::default()
        };
        let result: SetResponse = self.client.call(USING_MAIL, "Email/set", args).await?;
        Ok(json!({
            "destroyed": result.destroyed.unwrap_or_default(),
            "notDestroyed": result.not_destroyed.unwrap_or_default(),
        }))
    }

    /// Apply the same patch to every id in one batched `Email/set`
    async fn update_each(&self, ids: &[String], patch: &Map<String, Value>) -> AppResult<SetResponse> {
        let update = ids
            .iter()
            .map(|id| (id.clone(), Value::Object(patch.clone())))
            .collect::<Map<_, _>>();
        let args = SetArgs {
            update: Some(update),
            ..Default::default()
        };
        self.client.call(USING_MAIL, "Email/set", args).await
    }
}

/// Build a partial keyword patch
///
/// `Some(true)` sets the keyword and `Some(false)` removes it (`null`);
/// `None` leaves it out of the patch.
fn keyword_patch(seen: Option<bool>, flagged: Option<bool>) -> Map<String, Value> {
    let mut patch = Map::new();
    for (keyword, value) in [("$seen", seen), ("$flagged", flagged)] {
        if let Some(set) = value {
            patch.insert(
                format!("keywords/{keyword}"),
                if set { Value::Bool(true) } else { Value::Null },
            );
        }
    }
    patch
}

/// Build a patch replacing mailbox membership with exactly one mailbox
fn mailbox_patch(mailbox_id: &str) -> Map<String, Value> {
    let mut patch = Map::new();
    patch.insert("mailboxIds".to_owned(), json!({ mailbox_id: true }));
    patch
}

#[cfg(test)]
mod tests {
    use rmcp::handler::server::wrapper::Parameters;
    use serde_json::{Value, json};

    use super::keyword_patch;
    use crate::errors::AppError;
    use crate::jmap::testing::MockTransport;
    use crate::models::{
        DeleteEmailsInput, EmailProperty, GetEmailsInput, GetMailboxesInput, GetThreadsInput,
        MarkEmailsInput, MoveEmailsInput, SearchEmailsInput,
    };
    use crate::server::testing::{envelope_text, server};

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).expect("payload is JSON")
    }

    #[tokio::test]
    async fn search_without_filters_omits_filter_and_sorts_newest_first() {
        let transport = MockTransport::new();
        transport.reply(
            "Email/query",
            json!({
                "ids": ["E3", "E2"],
                "total": 2,
                "position": 0,
                "queryState": "q1",
                "canCalculateChanges": true
            }),
        );

        let result = server(&transport)
            .search_emails_impl(SearchEmailsInput {
                limit: 50,
                ..Default::default()
            })
            .await
            .expect("search succeeds");

        assert_eq!(
            result,
            json!({
                "ids": ["E3", "E2"],
                "total": 2,
                "position": 0,
                "queryState": "q1",
                "canCalculateChanges": true,
                "hasMore": false
            })
        );
        let args = transport.call_args(0);
        assert!(args.get("filter").is_none(), "no filter key: {args}");
        assert_eq!(args["sort"], json!([{ "property": "receivedAt", "isAscending": false }]));
        assert_eq!(args["limit"], 50);
        assert_eq!(args["calculateTotal"], true);
    }

    #[tokio::test]
    async fn search_reports_has_more_when_page_is_short_of_total() {
        let transport = MockTransport::new();
        transport.reply(
            "Email/query",
            json!({ "ids": ["E9"], "total": 3, "position": 1, "queryState": "q2" }),
        );

        let result = server(&transport)
            .search_emails_impl(SearchEmailsInput {
                query: Some("report".to_owned()),
                limit: 1,
                position: 1,
                ..Default::default()
            })
            .await
            .expect("search succeeds");

        assert_eq!(result["hasMore"], true);
        assert_eq!(transport.call_args(0)["filter"], json!({ "text": "report" }));
        assert_eq!(transport.call_args(0)["position"], 1);
    }

    #[tokio::test]
    async fn invalid_search_is_rejected_before_any_request() {
        let transport = MockTransport::new();
        let result = server(&transport)
            .search_emails(Parameters(SearchEmailsInput {
                limit: 500,
                ..Default::default()
            }))
            .await
            .expect("envelope");
        let text = envelope_text(result);
        assert!(text.starts_with("Error searching emails: invalid input: limit"));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn remote_failure_is_caught_into_text_envelope() {
        let transport = MockTransport::new();
        transport.fail(AppError::Remote("HTTP 503 Service Unavailable: ".to_owned()));
        let result = server(&transport)
            .get_threads(Parameters(GetThreadsInput {
                ids: vec!["T1".to_owned()],
            }))
            .await
            .expect("envelope");
        assert_eq!(
            envelope_text(result),
            "Error getting threads: HTTP 503 Service Unavailable: "
        );
    }

    #[tokio::test]
    async fn get_emails_passes_properties_and_reports_not_found() {
        let transport = MockTransport::new();
        transport.reply(
            "Email/get",
            json!({ "list": [{ "id": "E1", "subject": "Hi" }], "notFound": ["E2"] }),
        );

        let result = server(&transport)
            .get_emails_impl(GetEmailsInput {
                ids: vec!["E1".to_owned(), "E2".to_owned()],
                properties: Some(vec![EmailProperty::Id, EmailProperty::Subject]),
                fetch_text_body_values: Some(true),
                fetch_html_body_values: None,
                max_body_value_bytes: None,
            })
            .await
            .expect("get succeeds");

        assert_eq!(
            result,
            json!({ "emails": [{ "id": "E1", "subject": "Hi" }], "notFound": ["E2"] })
        );
        assert_eq!(
            transport.call_args(0),
            json!({
                "accountId": "A1",
                "ids": ["E1", "E2"],
                "properties": ["id", "subject"],
                "fetchTextBodyValues": true
            })
        );
    }

    #[tokio::test]
    async fn get_mailboxes_queries_then_fetches_in_sequence() {
        let transport = MockTransport::new();
        transport.reply(
            "Mailbox/query",
            json!({ "ids": ["M1", "M2"], "total": 5, "position": 0, "queryState": "mq" }),
        );
        transport.reply(
            "Mailbox/get",
            json!({ "list": [{ "id": "M1", "name": "Inbox" }, { "id": "M2", "name": "Sent" }] }),
        );

        let result = server(&transport)
            .get_mailboxes_impl(GetMailboxesInput {
                parent_id: Some("M0".to_owned()),
                limit: 2,
                position: 0,
            })
            .await
            .expect("listing succeeds");

        assert_eq!(transport.method(0), "Mailbox/query");
        assert_eq!(transport.call_args(0)["filter"], json!({ "parentId": "M0" }));
        assert_eq!(
            transport.call_args(0)["sort"],
            json!([{ "property": "sortOrder", "isAscending": true }])
        );
        assert_eq!(transport.method(1), "Mailbox/get");
        assert_eq!(transport.call_args(1)["ids"], json!(["M1", "M2"]));
        assert_eq!(result["mailboxes"].as_array().map(Vec::len), Some(2));
        assert_eq!(result["total"], 5);
        assert_eq!(result["hasMore"], true);
    }

    #[tokio::test]
    async fn get_mailboxes_skips_fetch_for_empty_page() {
        let transport = MockTransport::new();
        transport.reply("Mailbox/query", json!({ "ids": [], "total": 0, "position": 0 }));

        let result = server(&transport)
            .get_mailboxes_impl(GetMailboxesInput {
                parent_id: None,
                limit: 100,
                position: 0,
            })
            .await
            .expect("listing succeeds");

        assert_eq!(transport.requests().len(), 1);
        assert!(transport.call_args(0).get("filter").is_none());
        assert_eq!(result["mailboxes"], json!([]));
        assert_eq!(result["hasMore"], false);
    }

    #[test]
    fn keyword_patch_only_touches_supplied_keywords() {
        let seen_only = keyword_patch(Some(true), None);
        assert_eq!(Value::Object(seen_only), json!({ "keywords/$seen": true }));

        let unflag = keyword_patch(None, Some(false));
        assert_eq!(Value::Object(unflag), json!({ "keywords/$flagged": null }));

        assert!(keyword_patch(None, None).is_empty());
    }

    #[tokio::test]
    async fn mark_seen_only_leaves_flagged_untouched() {
        let transport = MockTransport::new();
        transport.reply(
            "Email/set",
            json!({
                "updated": { "E1": null },
                "notUpdated": { "E2": { "type": "notFound" } }
            }),
        );

        let result = server(&transport)
            .mark_emails_impl(MarkEmailsInput {
                ids: vec!["E1".to_owned(), "E2".to_owned()],
                seen: Some(true),
                flagged: None,
            })
            .await
            .expect("mark succeeds");

        let update = &transport.call_args(0)["update"];
        assert_eq!(update["E1"], json!({ "keywords/$seen": true }));
        assert_eq!(update["E2"], json!({ "keywords/$seen": true }));
        assert_eq!(
            result,
            json!({ "updated": ["E1"], "notUpdated": { "E2": { "type": "notFound" } } })
        );
    }

    #[tokio::test]
    async fn mark_without_keywords_sends_empty_patches() {
        let transport = MockTransport::new();
        transport.reply("Email/set", json!({ "updated": { "E1": null } }));

        server(&transport)
            .mark_emails_impl(MarkEmailsInput {
                ids: vec!["E1".to_owned()],
                seen: None,
                flagged: None,
            })
            .await
            .expect("mark succeeds");

        assert_eq!(transport.call_args(0)["update"], json!({ "E1": {} }));
    }

    #[tokio::test]
    async fn move_reports_partial_failure_as_success_payload() {
        let transport = MockTransport::new();
        transport.reply(
            "Email/set",
            json!({
                "updated": { "E2": {} },
                "notUpdated": {
                    "E1": { "type": "notFound", "description": "no such email" }
                }
            }),
        );

        let result = server(&transport)
            .move_emails(Parameters(MoveEmailsInput {
                ids: vec!["E1".to_owned(), "E2".to_owned()],
                mailbox_id: "M9".to_owned(),
            }))
            .await
            .expect("envelope");

        assert_eq!(transport.requests().len(), 1);
        let update = &transport.call_args(0)["update"];
        assert_eq!(update["E1"], json!({ "mailboxIds": { "M9": true } }));
        assert_eq!(update["E2"], json!({ "mailboxIds": { "M9": true } }));

        let payload = parse(&envelope_text(result));
        assert_eq!(payload["updated"], json!({ "E2": {} }));
        assert_eq!(payload["notUpdated"]["E1"]["type"], "notFound");
    }

    #[tokio::test]
    async fn delete_issues_one_destroy_call() {
        let transport = MockTransport::new();
        transport.reply(
            "Email/set",
            json!({
                "destroyed": ["E1"],
                "notDestroyed": { "E2": { "type": "forbidden" } }
            }),
        );

        let result = server(&transport)
            .delete_emails_impl(DeleteEmailsInput {
                ids: vec!["E1".to_owned(), "E2".to_owned()],
            })
            .await
            .expect("delete succeeds");

        assert_eq!(
            transport.call_args(0),
            json!({ "accountId": "A1", "destroy": ["E1", "E2"] })
        );
        assert_eq!(
            result,
            json!({ "destroyed": ["E1"], "notDestroyed": { "E2": { "type": "forbidden" } } })
        );
    }

    #[tokio::test]
    async fn get_threads_rejects_too_many_ids_without_request() {
        let transport = MockTransport::new();
        let ids = (0..21).map(|i| format!("T{i}")).collect();
        let err = server(&transport)
            .get_threads_impl(GetThreadsInput { ids })
            .await
            .expect_err("must fail");
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(transport.requests().is_empty());
    }
}
