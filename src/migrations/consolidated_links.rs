//! Moves embedded `consolidated_report` payloads into `consolidated_reports`
//! and points the owning document at the new record.

use super::Migration;
use crate::core::value::{
    as_document, describe_id, ensure_object_id, is_present, normalize_date, numeric_status,
    object_id_time,
};
use crate::core::{MigrateError, Result};
use crate::engine::{BatchCursorProcessor, DocumentVisitor, ExecutionContext, RunCounters};
use crate::storage::Filter;
use async_trait::async_trait;
use bson::{Bson, DateTime, Document, doc};
use serde::Serialize;
use tracing::{info, warn};

const CONSOLIDATED_REPORTS: &str = "consolidated_reports";
const PAYLOAD_FIELD: &str = "consolidated_report";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owner {
    /// `folder_reports`, linked through the `folderId` they carry.
    Folder,
    /// `feedback_questions`, linked through their own `_id`.
    Question,
}

impl Owner {
    fn collection(self) -> &'static str {
        match self {
            Owner::Folder => "folder_reports",
            Owner::Question => "feedback_questions",
        }
    }

    fn link_source(self) -> &'static str {
        match self {
            Owner::Folder => "folderId",
            Owner::Question => "_id",
        }
    }

    fn link_field(self) -> &'static str {
        match self {
            Owner::Folder => "ConsolidatedReportOf",
            Owner::Question => "consolidatedReportOf",
        }
    }

    fn source_type(self) -> &'static str {
        match self {
            Owner::Folder => "folder",
            Owner::Question => "question",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LinkedReportRecord {
    #[serde(rename = "_id")]
    id: Bson,
    source_type: &'static str,
    #[serde(flatten)]
    link: Document,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<Bson>,
    report: Document,
    #[serde(rename = "consolidated_report", skip_serializing_if = "Option::is_none")]
    consolidated_report: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime>,
}

fn date_of(document: &Document, key: &str) -> Option<DateTime> {
    document.get(key).and_then(normalize_date)
}

fn status_of(owner: Owner, payload: &Document, parent: &Document) -> Option<Bson> {
    let from_payload = numeric_status(payload.get("status"));
    match owner {
        Owner::Question => from_payload,
        Owner::Folder => from_payload
            .or_else(|| numeric_status(as_document(payload.get("report")).and_then(|r| r.get("status"))))
            .or_else(|| numeric_status(parent.get("status")))
            .or(Some(Bson::Int32(0))),
    }
}

/// Target record for `payload`, keyed by `report_id` and linked to `link_id`.
fn build_linked_report(
    owner: Owner,
    parent: &Document,
    payload: &Document,
    link_id: &Bson,
    report_id: &Bson,
) -> Result<Document> {
    // Missing dates fall back to the identifiers' embedded time, never the clock.
    let id_time = || {
        object_id_time(
            [parent.get("_id"), Some(link_id), Some(report_id)]
                .into_iter()
                .flatten(),
        )
    };
    let (created_at, updated_at) = match owner {
        Owner::Folder => {
            let created = date_of(payload, "createdAt")
                .or_else(|| date_of(parent, "createdAt"))
                .or_else(id_time);
            let updated = date_of(payload, "updatedAt")
                .or_else(|| date_of(parent, "updatedAt"))
                .or(created);
            (created, updated)
        }
        Owner::Question => {
            let created = date_of(payload, "createdAt").or_else(id_time);
            let updated = date_of(payload, "updatedAt").or(created);
            (created, updated)
        }
    };

    let report = as_document(payload.get("report")).unwrap_or(payload).clone();
    let record = LinkedReportRecord {
        id: report_id.clone(),
        source_type: owner.source_type(),
        link: doc! { owner.link_field(): link_id.clone() },
        status: status_of(owner, payload, parent),
        report,
        consolidated_report: (owner == Owner::Folder).then(|| payload.clone()),
        created_at,
        updated_at,
    };
    Ok(bson::to_document(&record)?)
}

struct LinkVisitor {
    owner: Owner,
    counters: RunCounters,
}

#[async_trait]
impl DocumentVisitor for LinkVisitor {
    async fn visit(&mut self, ctx: &ExecutionContext, parent: Document) -> Result<()> {
        let collection = self.owner.collection();
        let Some(payload) = as_document(parent.get(PAYLOAD_FIELD)) else {
            self.counters.bump("skipped");
            return Ok(());
        };

        let Some(link_id) = parent
            .get(self.owner.link_source())
            .filter(|id| is_present(Some(*id)))
            .map(ensure_object_id)
        else {
            warn!(
                "Skipping {} document {} without a usable {} when linking consolidated report payload.",
                collection,
                describe_id(parent.get("_id")),
                self.owner.link_source()
            );
            self.counters.bump("skipped");
            return Ok(());
        };

        let report_id = payload
            .get("_id")
            .filter(|id| is_present(Some(*id)))
            .map(ensure_object_id)
            .unwrap_or_else(|| link_id.clone());

        let record = build_linked_report(self.owner, &parent, payload, &link_id, &report_id)
            .map_err(|err| MigrateError::transform(collection, describe_id(parent.get("_id")), err.to_string()))?;
        ctx.upsert(&mut self.counters, CONSOLIDATED_REPORTS, &report_id, record)
            .await?;

        let linked = ctx
            .update_existing(
                collection,
                &link_id,
                doc! { self.owner.link_field(): report_id.clone() },
            )
            .await?;
        if linked {
            self.counters.bump("linked");
        } else {
            warn!(
                "No target {} document found for _id {} when linking consolidated report {}",
                collection,
                describe_id(Some(&link_id)),
                describe_id(Some(&report_id))
            );
            self.counters.bump("unlinked");
        }
        Ok(())
    }
}

async fn run_links(owner: Owner, ctx: &ExecutionContext) -> Result<RunCounters> {
    let collection = owner.collection();
    info!("Starting {} consolidated report linking migration", collection);

    let mut visitor = LinkVisitor {
        owner,
        counters: RunCounters::new(),
    };
    let summary = BatchCursorProcessor::new(collection)
        .filter(Filter::present(PAYLOAD_FIELD))
        .run(ctx, &mut visitor)
        .await?;

    let mut counters = visitor.counters;
    counters.add_processed(summary.processed);
    info!(
        "Finished processing {} {}. Consolidated reports upserted: {}, documents linked: {}, skipped: {}.",
        counters.processed(),
        collection,
        counters.upserts(CONSOLIDATED_REPORTS),
        counters.tally("linked"),
        counters.tally("skipped")
    );
    Ok(counters)
}

pub struct FolderReports;

#[async_trait]
impl Migration for FolderReports {
    fn id(&self) -> &'static str {
        "0005-folder_consolidated_reports"
    }

    fn description(&self) -> &'static str {
        "Copy folder_reports.consolidated_report payloads into consolidated_reports and link back references."
    }

    async fn up(&self, ctx: &ExecutionContext) -> Result<RunCounters> {
        run_links(Owner::Folder, ctx).await
    }
}

pub struct FeedbackQuestionReports;

#[async_trait]
impl Migration for FeedbackQuestionReports {
    fn id(&self) -> &'static str {
        "0006-feedback_questions_consolidated_reports"
    }

    fn description(&self) -> &'static str {
        "Copy feedback_questions.consolidated_report payloads into consolidated_reports and link back references."
    }

    async fn up(&self, ctx: &ExecutionContext) -> Result<RunCounters> {
        run_links(Owner::Question, ctx).await
    }
}
