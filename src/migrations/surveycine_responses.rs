use super::Migration;
use crate::core::path::get_path;
use crate::core::value::{
    as_document, coerce_bool, describe_id, ensure_number, ensure_object_id, is_present, is_truthy,
    normalize_date,
};
use crate::core::{MigrateError, Result};
use crate::engine::projection::{Section, coalesce, coalesce_truthy, copy_except, first_truthy, prune_nulls};
use crate::engine::{
    BatchCursorProcessor, DerivedRole, DocumentVisitor, ExecutionContext, RunCounters, derive_for_role,
};
use async_trait::async_trait;
use bson::{Bson, DateTime, Document, doc};
use serde::Serialize;
use tracing::info;

const FEEDBACK_RESPONSES: &str = "feedback_responses";
const RESPONSES: &str = "surveycine_responses";
const INSIGHTS: &str = "insights";
const REPORTS: &str = "reports";
const SOURCE_TYPE: &str = "surveycine";

/// Populates `surveycine_responses` plus the `insights` and `reports`
/// derived from recorded responses.
pub struct SurveycineResponses;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResponseRecord {
    #[serde(rename = "_id")]
    id: Bson,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<Bson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    city: Option<Bson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    age: Option<Bson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gender: Option<Bson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    feedback_id: Option<Bson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_deleted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_processing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    all_responses_submitted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    record_id: Option<Bson>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResponseInsightRecord {
    #[serde(rename = "_id")]
    id: Bson,
    insights_of: Bson,
    insights_of_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    video: Option<Section>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio: Option<Section>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_to_text: Option<Section>,
    #[serde(skip_serializing_if = "Option::is_none")]
    true_value_score: Option<Section>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<Section>,
    #[serde(skip_serializing_if = "Option::is_none")]
    questions: Option<Bson>,
    embeddings_generated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<Bson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResponseReportRecord {
    #[serde(rename = "_id")]
    id: Bson,
    report_of_id: Bson,
    report_of_type: &'static str,
    report: Document,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<Bson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<Bson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime>,
}

fn response_id(response: &Document) -> Result<Bson> {
    response
        .get("_id")
        .filter(|id| is_present(Some(*id)))
        .map(ensure_object_id)
        .ok_or_else(|| {
            MigrateError::transform(
                FEEDBACK_RESPONSES,
                describe_id(None),
                "unable to determine surveycine_responses _id",
            )
        })
}

fn date_of(document: &Document, key: &str) -> Option<DateTime> {
    document.get(key).and_then(normalize_date)
}

fn present(document: &Document, key: &str) -> Option<Bson> {
    document.get(key).filter(|value| is_present(Some(*value))).cloned()
}

pub(crate) fn build_response(response: &Document, id: &Bson) -> Result<Document> {
    let deleted = match response.get("isDeleted") {
        Some(value) => Some(value),
        None => response.get("deleted"),
    };
    let record = ResponseRecord {
        id: id.clone(),
        name: first_truthy(response, &["name", "userName"]).cloned(),
        city: present(response, "city"),
        age: ensure_number(response.get("age")),
        gender: present(response, "gender"),
        feedback_id: first_truthy(response, &["feedbackId", "feedback_id"]).map(ensure_object_id),
        is_deleted: coerce_bool(deleted),
        start_processing: coerce_bool(response.get("startProcessing")),
        all_responses_submitted: coerce_bool(response.get("allResponsesSubmitted")),
        created_at: date_of(response, "createdAt"),
        updated_at: date_of(response, "updatedAt"),
        record_id: response
            .get("recordId")
            .filter(|value| is_present(Some(*value)))
            .map(ensure_object_id),
    };
    Ok(bson::to_document(&record)?)
}

/// Splits `status` and `message` out of a pruned data map.
fn lift_section(mut data: Document) -> Section {
    let status = data.remove("status");
    let message = data.remove("message");
    Section {
        status,
        data: (!data.is_empty()).then_some(Bson::Document(data)),
        message,
        extra: Document::new(),
    }
}

fn video_section(response: &Document) -> Section {
    let video = as_document(response.get("video")).cloned().unwrap_or_default();
    let bucket_url = coalesce_truthy([
        response.get("video_url"),
        response.get("videoUrl"),
        video.get("bucketUrl"),
        video.get("url"),
        response.get("responseFile"),
    ]);
    let file = coalesce_truthy([video.get("file"), response.get("responseFile")]);
    let duration = coalesce([
        video.get("duration"),
        get_path(response, "speech_to_text.duration"),
        get_path(response, "speechToText.duration"),
    ]);

    lift_section(prune_nulls(doc! {
        "bucketUrl": bucket_url.cloned().unwrap_or(Bson::Null),
        "file": file.cloned().unwrap_or(Bson::Null),
        "status": video.get("status").cloned().unwrap_or(Bson::Null),
        "message": video.get("message").cloned().unwrap_or(Bson::Null),
        "duration": duration.cloned().unwrap_or(Bson::Null),
    }))
}

fn audio_section(response: &Document) -> Section {
    let audio = as_document(response.get("audio")).cloned().unwrap_or_default();
    let bucket_url = coalesce_truthy([response.get("audio_url"), audio.get("bucketUrl"), audio.get("url")]);

    lift_section(prune_nulls(doc! {
        "bucketUrl": bucket_url.cloned().unwrap_or(Bson::Null),
        "file": audio.get("file").cloned().unwrap_or(Bson::Null),
        "status": audio.get("status").cloned().unwrap_or(Bson::Null),
        "message": audio.get("message").cloned().unwrap_or(Bson::Null),
    }))
}

fn speech_section(response: &Document) -> Section {
    let speech = as_document(response.get("speech_to_text"))
        .or_else(|| as_document(response.get("speechToText")));
    let Some(speech) = speech else {
        return Section::default();
    };
    let mut extra = Document::new();
    if let Some(duration) = speech.get("duration") {
        extra.insert("duration", duration.clone());
    }
    Section {
        status: speech.get("status").cloned(),
        data: speech.get("data").cloned(),
        message: speech.get("message").cloned(),
        extra,
    }
}

fn score_section(response: &Document) -> Section {
    let source = response
        .get("true_value_score")
        .or_else(|| response.get("trueValueScore"));
    let mut section = match source {
        None | Some(Bson::Null) => Section::default(),
        Some(Bson::Document(score)) => {
            let data = match score.get("data") {
                Some(data) => Some(data.clone()),
                None => {
                    let rest = copy_except(score, &["status", "message"]);
                    (!rest.is_empty()).then_some(Bson::Document(rest))
                }
            };
            Section {
                status: score.get("status").cloned(),
                data,
                message: score.get("message").cloned(),
                extra: Document::new(),
            }
        }
        Some(other) => Section {
            data: Some(other.clone()),
            ..Section::default()
        },
    };

    let raw = response
        .get("true_value_score_raw")
        .or_else(|| response.get("trueValueScoreRaw"));
    let entries: Vec<Bson> = match raw {
        None | Some(Bson::Null) => Vec::new(),
        Some(Bson::Array(items)) => items
            .iter()
            .filter(|item| !matches!(item, Bson::Null))
            .cloned()
            .collect(),
        Some(other) => vec![other.clone()],
    };
    if !entries.is_empty() {
        section.extra.insert("raw", entries);
    }
    section
}

fn thumbnail_section(response: &Document) -> Section {
    let Some(thumbnail) = as_document(response.get("thumbnail")) else {
        return Section::default();
    };
    let mut data = as_document(thumbnail.get("files")).cloned().unwrap_or_default();
    if let Some(processed_at) = date_of(thumbnail, "processedAt") {
        data.insert("processedAt", processed_at);
    }
    Section {
        status: thumbnail.get("status").cloned(),
        data: (!data.is_empty()).then_some(Bson::Document(data)),
        message: thumbnail.get("message").cloned(),
        extra: Document::new(),
    }
}

fn non_empty(section: Section) -> Option<Section> {
    (!section.is_empty()).then_some(section)
}

/// Insight for a recorded response, or `None` when it has no payload.
pub(crate) fn build_insight(response: &Document, response_id: &Bson) -> Result<Option<Document>> {
    let source_id = response.get("_id").unwrap_or(response_id);
    let questions = response
        .get("questions")
        .filter(|value| matches!(value, Bson::Array(items) if !items.is_empty()))
        .cloned();

    let record = ResponseInsightRecord {
        id: Bson::ObjectId(derive_for_role(source_id, DerivedRole::Insight)),
        insights_of: response_id.clone(),
        insights_of_type: SOURCE_TYPE,
        video: non_empty(video_section(response)),
        audio: non_empty(audio_section(response)),
        speech_to_text: non_empty(speech_section(response)),
        true_value_score: non_empty(score_section(response)),
        thumbnail: non_empty(thumbnail_section(response)),
        questions,
        embeddings_generated: response.get("isSaveEmbeddings").is_some_and(is_truthy),
        message: response.get("message").cloned(),
        created_at: date_of(response, "createdAt"),
        updated_at: date_of(response, "updatedAt"),
    };

    let has_payload = record.video.is_some()
        || record.audio.is_some()
        || record.speech_to_text.is_some()
        || record.true_value_score.is_some()
        || record.thumbnail.is_some()
        || record.questions.is_some()
        || record.embeddings_generated
        || record.message.is_some();
    if !has_payload {
        return Ok(None);
    }
    Ok(Some(bson::to_document(&record)?))
}

/// Report for a recorded response, or `None` without a report object.
pub(crate) fn build_report(response: &Document, response_id: &Bson) -> Result<Option<Document>> {
    let Some(report) = as_document(response.get("report")) else {
        return Ok(None);
    };
    let source_id = response.get("_id").unwrap_or(response_id);
    let created_at = date_of(report, "createdAt").or_else(|| date_of(response, "createdAt"));
    let updated_at = date_of(report, "updatedAt")
        .or_else(|| date_of(response, "updatedAt"))
        .or(created_at);

    let record = ResponseReportRecord {
        id: Bson::ObjectId(derive_for_role(source_id, DerivedRole::Report)),
        report_of_id: response_id.clone(),
        report_of_type: SOURCE_TYPE,
        report: report.clone(),
        status: report.get("status").or_else(|| response.get("status")).cloned(),
        message: report.get("message").or_else(|| response.get("message")).cloned(),
        created_at,
        updated_at,
    };
    Ok(Some(bson::to_document(&record)?))
}

struct ResponseVisitor {
    counters: RunCounters,
}

#[async_trait]
impl DocumentVisitor for ResponseVisitor {
    async fn visit(&mut self, ctx: &ExecutionContext, response: Document) -> Result<()> {
        let id = response_id(&response)?;
        let record = build_response(&response, &id)?;
        ctx.replace(&mut self.counters, RESPONSES, &id, record).await?;

        if !response.get("recordId").is_some_and(is_truthy) {
            self.counters.bump("without_record_id");
            return Ok(());
        }

        match build_insight(&response, &id)? {
            Some(insight) => {
                let insight_id = insight.get("_id").cloned().unwrap_or(Bson::Null);
                ctx.replace(&mut self.counters, INSIGHTS, &insight_id, insight).await?;
            }
            None => self.counters.bump("skipped_insights"),
        }

        match build_report(&response, &id)? {
            Some(report) => {
                let report_id = report.get("_id").cloned().unwrap_or(Bson::Null);
                ctx.replace(&mut self.counters, REPORTS, &report_id, report).await?;
            }
            None => self.counters.bump("skipped_reports"),
        }
        Ok(())
    }
}

#[async_trait]
impl Migration for SurveycineResponses {
    fn id(&self) -> &'static str {
        "0007-surveycine_responses"
    }

    fn description(&self) -> &'static str {
        "Populate surveycine_responses, insights, and reports collections from feedback_responses."
    }

    async fn up(&self, ctx: &ExecutionContext) -> Result<RunCounters> {
        let mut visitor = ResponseVisitor {
            counters: RunCounters::new(),
        };
        let summary = BatchCursorProcessor::new(FEEDBACK_RESPONSES)
            .run(ctx, &mut visitor)
            .await?;

        let mut counters = visitor.counters;
        counters.add_processed(summary.processed);
        info!(
            "Migration finished. Processed: {}, surveycine_responses upserts: {}, insights upserts: {}, reports upserts: {}, without recordId: {}, skipped insights: {}, skipped reports: {}.",
            counters.processed(),
            counters.upserts(RESPONSES),
            counters.upserts(INSIGHTS),
            counters.upserts(REPORTS),
            counters.tally("without_record_id"),
            counters.tally("skipped_insights"),
            counters.tally("skipped_reports")
        );
        Ok(counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;

    #[test]
    fn test_response_fields_are_coerced() {
        let oid = ObjectId::new();
        let feedback = ObjectId::new();
        let response = doc! {
            "_id": oid,
            "userName": "Ana",
            "age": "31",
            "feedback_id": feedback.to_hex(),
            "deleted": "no",
            "startProcessing": 1,
            "createdAt": "2024-02-02T10:00:00Z",
            "recordId": Bson::Null,
        };
        let record = build_response(&response, &Bson::ObjectId(oid)).unwrap();

        assert_eq!(record.get_str("name").unwrap(), "Ana");
        assert_eq!(record.get_i32("age").unwrap(), 31);
        assert_eq!(record.get_object_id("feedbackId").unwrap(), feedback);
        assert_eq!(record.get_bool("isDeleted").unwrap(), false);
        assert_eq!(record.get_bool("startProcessing").unwrap(), true);
        assert!(record.get_datetime("createdAt").is_ok());
        assert!(!record.contains_key("recordId"));
        assert!(!record.contains_key("city"));
    }

    #[test]
    fn test_insight_requires_payload() {
        let oid = ObjectId::new();
        let bare = doc! { "_id": oid, "recordId": "rec-1" };
        assert!(build_insight(&bare, &Bson::ObjectId(oid)).unwrap().is_none());

        let with_message = doc! { "_id": oid, "recordId": "rec-1", "message": "queued" };
        let insight = build_insight(&with_message, &Bson::ObjectId(oid)).unwrap().unwrap();
        assert_eq!(insight.get_str("insightsOfType").unwrap(), "surveycine");
        assert_eq!(insight.get_object_id("insightsOf").unwrap(), oid);
    }

    #[test]
    fn test_video_section_lifts_status() {
        let response = doc! {
            "responseFile": "s3://r.webm",
            "video": { "status": 2, "duration": 40 },
        };
        let section = video_section(&response);
        assert_eq!(section.status, Some(Bson::Int32(2)));
        assert_eq!(
            section.data,
            Some(Bson::Document(doc! { "bucketUrl": "s3://r.webm", "file": "s3://r.webm", "duration": 40 }))
        );
    }

    #[test]
    fn test_raw_scores_attach_to_score_section() {
        let response = doc! { "trueValueScoreRaw": [1, Bson::Null, 2] };
        let section = score_section(&response);
        assert_eq!(section.extra, doc! { "raw": [1, 2] });
    }

    #[test]
    fn test_report_uses_report_of_type() {
        let oid = ObjectId::new();
        let response = doc! { "_id": oid, "status": 1, "report": { "verdict": "ok" } };
        let report = build_report(&response, &Bson::ObjectId(oid)).unwrap().unwrap();
        assert_eq!(report.get_str("reportOfType").unwrap(), "surveycine");
        assert_eq!(report.get_i32("status").unwrap(), 1);
        assert_eq!(report.get_document("report").unwrap(), &doc! { "verdict": "ok" });
        assert_ne!(report.get_object_id("_id").unwrap(), oid);
    }
}
