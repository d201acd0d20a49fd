use super::Migration;
use crate::core::value::{
    as_document, describe_id, ensure_object_id, is_present, normalize_date, object_id_time,
};
use crate::core::{MigrateError, Result};
use crate::engine::projection::{copy_except, first_defined};
use crate::engine::{BatchCursorProcessor, DocumentVisitor, ExecutionContext, RunCounters};
use async_trait::async_trait;
use bson::{Bson, DateTime, Document};
use serde::Serialize;
use tracing::{info, warn};

const FEEDBACK_REQUESTS: &str = "feedback_requests";
const SURVEYS: &str = "surveycine_surveys";
const CONSOLIDATED_REPORTS: &str = "consolidated_reports";

/// Populates `surveycine_surveys` and `consolidated_reports` from `feedback_requests`.
pub struct SurveycineSurveys;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConsolidatedRecord {
    #[serde(rename = "_id")]
    id: Bson,
    source_type: &'static str,
    consolidated_report_of: Bson,
    status: Bson,
    report: ConsolidatedReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConsolidatedReport {
    sentiment: Document,
    true_value_score: Document,
    opinion_snippets: Vec<Document>,
    verdict: Bson,
    bias: Document,
    brand_recall_score: Document,
}

fn request_id(request: &Document) -> Result<Bson> {
    request
        .get("_id")
        .filter(|id| is_present(Some(*id)))
        .map(ensure_object_id)
        .ok_or_else(|| MigrateError::transform(FEEDBACK_REQUESTS, describe_id(None), "missing _id"))
}

pub(crate) fn build_survey(request: &Document, id: &Bson) -> Document {
    let mut survey = copy_except(request, &["consolidated_reports", "consolidatedReport"]);
    survey.insert("_id", id.clone());
    survey
}

fn object_or_empty(payload: &Document, keys: &[&str]) -> Document {
    as_document(first_defined(payload, keys)).cloned().unwrap_or_default()
}

fn opinion_snippets(payload: &Document) -> Vec<Document> {
    let Some(Bson::Array(items)) = first_defined(payload, &["opinionSnippets", "opinion_snippets"]) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| as_document(Some(item)))
        .map(|snippet| {
            ["text", "time", "thumbnail"]
                .into_iter()
                .filter_map(|key| snippet.get(key).map(|value| (key.to_string(), value.clone())))
                .collect()
        })
        .collect()
}

fn determine_status(source: &Document, request: &Document) -> Bson {
    source
        .get("status")
        .or_else(|| as_document(source.get("report")).and_then(|report| report.get("status")))
        .or_else(|| request.get("status"))
        .cloned()
        .unwrap_or(Bson::Int32(0))
}

/// Consolidated report extracted from the request, if it carries one.
pub(crate) fn build_consolidated(request: &Document, request_id: &Bson) -> Result<Option<Document>> {
    let Some(source) = as_document(request.get("consolidated_reports")) else {
        return Ok(None);
    };

    let id = source
        .get("_id")
        .filter(|id| is_present(Some(*id)))
        .map(ensure_object_id)
        .unwrap_or_else(|| request_id.clone());

    let created_at = source
        .get("createdAt")
        .and_then(normalize_date)
        .or_else(|| request.get("createdAt").and_then(normalize_date))
        .or_else(|| object_id_time([request_id, &id]));
    let updated_at = source
        .get("updatedAt")
        .and_then(normalize_date)
        .or_else(|| request.get("updatedAt").and_then(normalize_date))
        .or(created_at);

    let payload = as_document(source.get("report")).unwrap_or(source);
    let report = ConsolidatedReport {
        sentiment: object_or_empty(payload, &["sentiment"]),
        true_value_score: object_or_empty(payload, &["trueValueScore", "true_value_score"]),
        opinion_snippets: opinion_snippets(payload),
        verdict: first_defined(payload, &["verdict"])
            .filter(|value| !matches!(value, Bson::Null))
            .cloned()
            .unwrap_or_else(|| Bson::String(String::new())),
        bias: object_or_empty(payload, &["bias"]),
        brand_recall_score: object_or_empty(payload, &["brandRecallScore", "brand_recall_score"]),
    };

    let record = ConsolidatedRecord {
        id,
        source_type: "surveycine",
        consolidated_report_of: request_id.clone(),
        status: determine_status(source, request),
        report,
        created_at,
        updated_at,
    };
    Ok(Some(bson::to_document(&record)?))
}

struct SurveyVisitor {
    counters: RunCounters,
}

#[async_trait]
impl DocumentVisitor for SurveyVisitor {
    async fn visit(&mut self, ctx: &ExecutionContext, request: Document) -> Result<()> {
        let id = request_id(&request)?;

        let survey = build_survey(&request, &id);
        ctx.replace(&mut self.counters, SURVEYS, &id, survey).await?;

        match build_consolidated(&request, &id)? {
            Some(report) => {
                let report_id = report.get("_id").cloned().unwrap_or_else(|| id.clone());
                ctx.replace(&mut self.counters, CONSOLIDATED_REPORTS, &report_id, report)
                    .await?;
            }
            None => {
                self.counters.bump("missing_consolidated");
                warn!(
                    "No consolidated_reports payload found for feedback {}; skipping consolidated_reports upsert.",
                    describe_id(Some(&id))
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Migration for SurveycineSurveys {
    fn id(&self) -> &'static str {
        "0004-surveycine_surveys"
    }

    fn description(&self) -> &'static str {
        "Populate surveycine_surveys and consolidated_reports collections from feedback_requests."
    }

    async fn up(&self, ctx: &ExecutionContext) -> Result<RunCounters> {
        info!("Starting migration: feedback_requests -> surveycine_surveys & consolidated_reports");

        let mut visitor = SurveyVisitor {
            counters: RunCounters::new(),
        };
        let summary = BatchCursorProcessor::new(FEEDBACK_REQUESTS)
            .run(ctx, &mut visitor)
            .await?;

        let mut counters = visitor.counters;
        counters.add_processed(summary.processed);
        info!(
            "Migration complete. Total feedback_requests processed: {}. surveycine_surveys upserts: {}, consolidated_reports upserts: {}, missing consolidated payloads: {}.",
            counters.processed(),
            counters.upserts(SURVEYS),
            counters.upserts(CONSOLIDATED_REPORTS),
            counters.tally("missing_consolidated")
        );
        Ok(counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use bson::oid::ObjectId;

    #[test]
    fn test_survey_drops_embedded_reports() {
        let oid = ObjectId::new();
        let request = doc! {
            "_id": oid.to_hex(),
            "title": "Trailer test",
            "consolidated_reports": { "verdict": "good" },
            "consolidatedReport": {},
        };
        let id = request_id(&request).unwrap();
        assert_eq!(id, Bson::ObjectId(oid));
        assert_eq!(
            build_survey(&request, &id),
            doc! { "_id": oid, "title": "Trailer test" }
        );
    }

    #[test]
    fn test_consolidated_report_shape() {
        let request_oid = ObjectId::new();
        let request = doc! {
            "_id": request_oid,
            "status": 1,
            "createdAt": "2024-03-01T00:00:00Z",
            "consolidated_reports": {
                "report": {
                    "sentiment": { "positive": 0.7 },
                    "true_value_score": { "score": 80 },
                    "opinion_snippets": [ { "text": "love it", "time": 3, "extra": true }, "noise" ],
                    "verdict": Bson::Null,
                    "status": 2,
                },
            },
        };
        let report = build_consolidated(&request, &Bson::ObjectId(request_oid))
            .unwrap()
            .unwrap();

        assert_eq!(report.get_object_id("_id").unwrap(), request_oid);
        assert_eq!(report.get_str("sourceType").unwrap(), "surveycine");
        assert_eq!(report.get_object_id("consolidatedReportOf").unwrap(), request_oid);
        assert_eq!(report.get_i32("status").unwrap(), 2);

        let body = report.get_document("report").unwrap();
        assert_eq!(body.get_document("trueValueScore").unwrap(), &doc! { "score": 80 });
        assert_eq!(
            body.get_array("opinionSnippets").unwrap(),
            &vec![Bson::Document(doc! { "text": "love it", "time": 3 })]
        );
        assert_eq!(body.get_str("verdict").unwrap(), "");
        assert_eq!(body.get_document("bias").unwrap(), &Document::new());
        assert_eq!(report.get_datetime("createdAt").unwrap(), report.get_datetime("updatedAt").unwrap());
    }

    #[test]
    fn test_undated_report_uses_request_id_time() {
        let request_oid = ObjectId::new();
        let request = doc! { "_id": request_oid, "consolidated_reports": { "verdict": "ok" } };
        let id = Bson::ObjectId(request_oid);

        let first = build_consolidated(&request, &id).unwrap().unwrap();
        let second = build_consolidated(&request, &id).unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.get_datetime("createdAt").unwrap(), &request_oid.timestamp());
        assert_eq!(first.get_datetime("updatedAt").unwrap(), &request_oid.timestamp());
    }

    #[test]
    fn test_missing_payload() {
        let request = doc! { "_id": ObjectId::new() };
        assert!(build_consolidated(&request, &Bson::Null).unwrap().is_none());
    }
}
