//! Splits legacy `projects` documents into `projects`, `insights` and `reports`.
//!
//! The legacy project carried every processing stage (video, audio,
//! transcription, scoring, thumbnails, chat questions) and the generated
//! report inline. The new schema keeps the project lean and moves the
//! processing output to an insight and the report to its own collection,
//! both keyed by identifiers derived from the project id.

use super::Migration;
use crate::core::path::get_path;
use crate::core::value::{
    as_document, describe_id, ensure_date, ensure_object_id, is_present, is_truthy, to_object_id,
};
use crate::core::{MigrateError, Result};
use crate::engine::projection::{
    Section, coalesce, coalesce_truthy, copy_except, first_defined, first_truthy, prune_nulls,
};
use crate::engine::{
    BatchCursorProcessor, DerivedRole, DocumentVisitor, ExecutionContext, ReferenceIndex,
    ReferenceIndexBuilder, RunCounters, derive_for_role,
};
use async_trait::async_trait;
use bson::{Bson, Document, doc};
use serde::Serialize;
use tracing::{debug, info};

const PROJECTS: &str = "projects";
const INSIGHTS: &str = "insights";
const REPORTS: &str = "reports";
const UNIT_USAGE: &str = "unit_usage";
const INSIGHT_TYPE: &str = "instavidq";

/// Fields moved out of the project document.
const PROJECT_EXCLUDED_KEYS: &[&str] = &[
    "video",
    "video_url",
    "videoUrl",
    "videoMetadata",
    "video_metadata",
    "audio",
    "audio_url",
    "audioUrl",
    "speech_to_text",
    "speechToText",
    "true_value_score",
    "trueValueScore",
    "true_value_score_raw",
    "trueValueScoreRaw",
    "thumbnail",
    "thumbnails",
    "questions",
    "isSaveEmbeddings",
    "isUnitDeduct",
    "report",
    "message",
    "sucess",
    "success",
    "failure",
    "deleted",
    "transId",
];

/// Fields of a unit_usage record that may point at a project.
const UNIT_USAGE_REFERENCE_FIELDS: &[&str] = &[
    "projectId",
    "project_id",
    "projectIdRef",
    "project_id_ref",
    "collectionRef",
];

/// Fields of a project that may match a unit_usage reference, by priority.
const PROJECT_REFERENCE_FIELDS: &[&str] = &[
    "_id",
    "projectId",
    "project_id",
    "projectIdRef",
    "project_id_ref",
    "collectionRef",
];

/// Report keys read into typed fields; the rest pass through unchanged.
const REPORT_CONSUMED_KEYS: &[&str] = &[
    "reportOfType",
    "report_of_type",
    "duration",
    "emotionAnalysis",
    "emotion_analysis_llama",
    "emotion_analysis",
    "emotionGraph",
    "emotion_graph",
    "opinionSnippet",
    "opinion_snippet",
    "toneAnalysis",
    "tone_analysis",
    "engagementLevel",
    "engagement_level",
    "actionIntentions",
    "action_intentions",
    "verdict",
    "contrastingOpinions",
    "contrasting_opinions",
    "brandRecall",
    "brand_recall",
    "summary",
    "title",
    "category",
    "category_report",
    "status",
    "message",
    "createdAt",
    "updatedAt",
    "_id",
    "reportOfId",
];

pub struct ProjectsSplit;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsightRecord {
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
    thumbnails: Option<Section>,
    chat_questions: Section,
    embeddings_generated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<Bson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<Bson>,
    is_unit_deduct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    trans_id: Option<Bson>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportRecord {
    #[serde(rename = "_id")]
    id: Bson,
    report_of_id: Bson,
    report_of_type: &'static str,
    duration: Bson,
    emotion_analysis: Bson,
    emotion_graph: Bson,
    opinion_snippet: Bson,
    tone_analysis: Bson,
    engagement_level: Bson,
    action_intentions: Bson,
    verdict: Bson,
    contrasting_opinions: Bson,
    brand_recall: Bson,
    summary: Bson,
    title: Bson,
    category: Bson,
    #[serde(rename = "category_report")]
    category_report: Bson,
    status: Bson,
    message: Bson,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<Bson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<Bson>,
    #[serde(flatten)]
    extra: Document,
}

fn project_id(project: &Document) -> Result<&Bson> {
    project
        .get("_id")
        .filter(|id| is_present(Some(*id)))
        .ok_or_else(|| MigrateError::transform(PROJECTS, describe_id(None), "missing _id"))
}

fn sub_document<'a>(document: &'a Document, key: &str) -> Option<&'a Document> {
    as_document(document.get(key))
}

/// Empty document standing in for a missing or non-object member.
fn sub_or_empty(document: &Document, key: &str) -> Document {
    sub_document(document, key).cloned().unwrap_or_default()
}

fn set_or_remove(document: &mut Document, key: &str, value: Option<Bson>) {
    match value {
        Some(value) => {
            document.insert(key, value);
        }
        None => {
            document.remove(key);
        }
    }
}

/// Lean project document for the new schema.
pub(crate) fn transform_project(project: &Document) -> Document {
    let mut transformed = copy_except(project, PROJECT_EXCLUDED_KEYS);

    let description =
        first_truthy(project, &["projectDescription", "project_description", "projectSummary"]);
    set_or_remove(&mut transformed, "projectDescription", description.cloned());

    let link = coalesce_truthy([
        project.get("link"),
        project.get("video_url"),
        get_path(project, "video.file"),
        project.get("audio_url"),
    ]);
    set_or_remove(&mut transformed, "link", link.cloned());

    match (project.get("isDeleted"), project.get("deleted")) {
        (Some(Bson::Boolean(flag)), _) | (_, Some(Bson::Boolean(flag))) => {
            transformed.insert("isDeleted", *flag);
        }
        _ => {}
    }

    for key in ["createdAt", "updatedAt"] {
        if transformed.contains_key(key) {
            let date = ensure_date(project.get(key)).filter(is_truthy);
            set_or_remove(&mut transformed, key, date);
        }
    }

    transformed
}

fn media_section(source: &Document, data: Document) -> Section {
    let data = prune_nulls(data);
    Section {
        status: source.get("status").cloned(),
        data: (!data.is_empty()).then_some(Bson::Document(data)),
        message: source.get("message").cloned(),
        extra: Document::new(),
    }
}

/// Project fields that show a video was actually attached.
const VIDEO_SOURCE_KEYS: &[&str] = &["video", "video_url", "videoUrl", "videoMetadata", "video_metadata"];

/// Video section. Title and duration fallbacks only decorate a section that
/// already has a video source; on their own they never produce one.
fn build_video(project: &Document) -> Section {
    if first_truthy(project, VIDEO_SOURCE_KEYS).is_none() {
        return Section::default();
    }
    let video = sub_or_empty(project, "video");
    let metadata = first_truthy(project, &["videoMetadata", "video_metadata"])
        .and_then(|value| as_document(Some(value)))
        .cloned()
        .unwrap_or_default();

    let bucket_url = coalesce_truthy([
        project.get("video_url"),
        project.get("videoUrl"),
        video.get("url"),
        video.get("bucketUrl"),
    ]);
    let title = coalesce_truthy([
        get_path(project, "report.title"),
        project.get("projectName"),
        video.get("title"),
    ]);
    let duration = coalesce([
        metadata.get("duration"),
        get_path(project, "report.duration"),
        get_path(project, "speech_to_text.duration"),
        get_path(project, "speechToText.duration"),
        video.get("duration"),
    ]);
    let height = coalesce([metadata.get("height"), video.get("height")]);
    let width = coalesce([metadata.get("width"), video.get("width")]);

    let data = doc! {
        "bucketUrl": bucket_url.cloned().unwrap_or(Bson::Null),
        "title": title.cloned().unwrap_or(Bson::Null),
        "duration": duration.cloned().unwrap_or(Bson::Null),
        "height": height.cloned().unwrap_or(Bson::Null),
        "width": width.cloned().unwrap_or(Bson::Null),
    };
    media_section(&video, data)
}

fn build_audio(project: &Document) -> Section {
    let audio = sub_or_empty(project, "audio");
    let bucket_url = coalesce_truthy([project.get("audio_url"), audio.get("url"), audio.get("bucketUrl")]);
    let source_url = first_truthy(&audio, &["sourceUrl", "sourceFile", "file"]);

    let data = doc! {
        "bucketUrl": bucket_url.cloned().unwrap_or(Bson::Null),
        "sourceUrl": source_url.cloned().unwrap_or(Bson::Null),
    };
    media_section(&audio, data)
}

fn build_speech_to_text(project: &Document) -> Section {
    let speech = first_truthy(project, &["speech_to_text", "speechToText"])
        .and_then(|value| as_document(Some(value)))
        .cloned()
        .unwrap_or_default();

    let mut extra = Document::new();
    for key in ["duration", "emotionSummary"] {
        if let Some(value) = speech.get(key) {
            extra.insert(key, value.clone());
        }
    }
    Section {
        status: speech.get("status").cloned(),
        data: speech.get("data").cloned(),
        message: speech.get("message").cloned(),
        extra,
    }
}

/// Text form of a raw score entry.
fn raw_entry(value: &Bson) -> Bson {
    match value {
        Bson::String(text) => Bson::String(text.clone()),
        other => Bson::String(other.clone().into_relaxed_extjson().to_string()),
    }
}

fn build_true_value_score(project: &Document) -> Section {
    let source = first_truthy(project, &["true_value_score", "trueValueScore"]);
    let raw = first_truthy(project, &["true_value_score_raw", "trueValueScoreRaw"]);

    let mut data = Document::new();
    let mut has_data = false;
    let mut section = Section::default();

    match source {
        Some(Bson::Document(score)) => {
            section.status = score.get("status").cloned();
            section.message = score.get("message").cloned();
            match score.get("data") {
                Some(Bson::Document(inner)) => {
                    has_data |= !inner.is_empty();
                    data.extend(inner.clone());
                }
                Some(other) => {
                    data.insert("value", other.clone());
                    has_data = true;
                }
                None => {}
            }
            let fallback = copy_except(score, &["status", "data"]);
            if !fallback.is_empty() {
                data.extend(fallback);
                has_data = true;
            }
        }
        Some(other) => {
            data.insert("value", other.clone());
            has_data = true;
        }
        None => {}
    }

    let raw_entries: Vec<Bson> = match raw {
        Some(Bson::Array(items)) => items.iter().map(raw_entry).collect(),
        Some(other) => vec![raw_entry(other)],
        None => Vec::new(),
    };
    if !raw_entries.is_empty() {
        data.insert("trueValueScoreRaw", raw_entries);
        has_data = true;
    }

    if has_data {
        section.data = Some(Bson::Document(data));
    }
    section
}

fn build_thumbnails(project: &Document) -> Section {
    let Some(thumbnail) = first_truthy(project, &["thumbnail", "thumbnails"]) else {
        return Section::default();
    };
    let thumbnail = as_document(Some(thumbnail)).cloned().unwrap_or_default();

    let mut data = first_truthy(&thumbnail, &["files", "data"])
        .and_then(|value| as_document(Some(value)))
        .cloned()
        .unwrap_or_default();
    if let Some(processed_at) = ensure_date(thumbnail.get("processedAt")) {
        data.insert("processedAt", processed_at);
    }

    Section {
        status: thumbnail.get("status").cloned(),
        data: (!data.is_empty()).then_some(Bson::Document(data)),
        message: thumbnail.get("message").cloned(),
        extra: Document::new(),
    }
}

fn build_chat_questions(project: &Document) -> (Section, bool) {
    let questions = project
        .get("questions")
        .filter(|value| is_truthy(value))
        .cloned()
        .unwrap_or_else(|| Bson::Array(Vec::new()));
    let asked = matches!(&questions, Bson::Array(items) if !items.is_empty());
    let section = Section {
        status: Some(Bson::Int32(if asked { 2 } else { 0 })),
        data: Some(questions),
        ..Section::default()
    };
    (section, asked)
}

fn determine_is_unit_deduct(project: &Document) -> bool {
    match (project.get("isUnitDeduct"), project.get("sucess"), project.get("failure")) {
        (Some(Bson::Boolean(flag)), _, _) => *flag,
        (_, Some(Bson::Boolean(flag)), _) => *flag,
        (_, _, Some(Bson::Boolean(failed))) => !*failed,
        _ => false,
    }
}

fn resolve_trans_id(project: &Document, index: &ReferenceIndex) -> Option<Bson> {
    let candidates = PROJECT_REFERENCE_FIELDS.iter().filter_map(|field| project.get(*field));
    if let Some(found) = index.resolve(candidates) {
        return Some(found.clone());
    }

    let literal = project.get("transId").filter(|value| is_truthy(value));
    let resolved = match literal {
        Some(value) => match to_object_id(value) {
            Some(oid) => Some(Bson::ObjectId(oid)),
            None => matches!(value, Bson::String(_)).then(|| value.clone()),
        },
        None => None,
    };
    if resolved.is_none() && index.is_available() {
        debug!(
            "unit_usage transId not found for project {}",
            describe_id(project.get("_id"))
        );
    }
    resolved
}

/// Insight holding the processing output, or `None` when there is none.
pub(crate) fn build_insight(project: &Document, index: &ReferenceIndex) -> Result<Option<Document>> {
    let id = project_id(project)?;

    let video = build_video(project).finish();
    let audio = build_audio(project).finish();
    let speech_to_text = build_speech_to_text(project).finish();
    let true_value_score = build_true_value_score(project).finish();
    let thumbnails = build_thumbnails(project).finish();
    let (chat_questions, asked) = build_chat_questions(project);

    let has_content = video.is_some()
        || audio.is_some()
        || speech_to_text.is_some()
        || true_value_score.is_some()
        || thumbnails.is_some()
        || asked;
    if !has_content {
        return Ok(None);
    }

    let record = InsightRecord {
        id: Bson::ObjectId(derive_for_role(id, DerivedRole::Insight)),
        insights_of: ensure_object_id(id),
        insights_of_type: INSIGHT_TYPE,
        video,
        audio,
        speech_to_text,
        true_value_score,
        thumbnails,
        chat_questions,
        embeddings_generated: project.get("isSaveEmbeddings").is_some_and(is_truthy),
        created_at: ensure_date(project.get("createdAt")),
        updated_at: ensure_date(project.get("updatedAt")),
        is_unit_deduct: determine_is_unit_deduct(project),
        trans_id: resolve_trans_id(project, index),
    };
    Ok(Some(bson::to_document(&record)?))
}

fn defined_or(report: &Document, keys: &[&str], default: Bson) -> Bson {
    first_defined(report, keys).cloned().unwrap_or(default)
}

/// Like [`defined_or`], but a falsy stored value also falls back.
fn truthy_or(report: &Document, keys: &[&str], default: Bson) -> Bson {
    first_defined(report, keys)
        .filter(|value| is_truthy(value))
        .cloned()
        .unwrap_or(default)
}

fn date_from(primary: Option<&Bson>, fallback: Option<&Bson>) -> Option<Bson> {
    ensure_date(primary)
        .filter(is_truthy)
        .or_else(|| ensure_date(fallback))
}

/// Standalone report, or `None` when the project has no report object.
pub(crate) fn build_report(project: &Document) -> Result<Option<Document>> {
    let Some(report) = sub_document(project, "report") else {
        return Ok(None);
    };
    let id = project_id(project)?;
    let empty_array = || Bson::Array(Vec::new());
    let empty_doc = || Bson::Document(Document::new());

    let title_default = project
        .get("projectName")
        .filter(|value| is_truthy(value))
        .cloned()
        .unwrap_or(Bson::Null);
    let message_default = project
        .get("message")
        .filter(|value| is_truthy(value))
        .cloned()
        .unwrap_or_else(|| Bson::String(String::new()));

    let record = ReportRecord {
        id: Bson::ObjectId(derive_for_role(id, DerivedRole::Report)),
        report_of_id: ensure_object_id(id),
        report_of_type: INSIGHT_TYPE,
        duration: defined_or(report, &["duration"], Bson::Null),
        emotion_analysis: truthy_or(
            report,
            &["emotionAnalysis", "emotion_analysis_llama", "emotion_analysis"],
            empty_array(),
        ),
        emotion_graph: truthy_or(report, &["emotionGraph", "emotion_graph"], empty_doc()),
        opinion_snippet: truthy_or(report, &["opinionSnippet", "opinion_snippet"], empty_array()),
        tone_analysis: truthy_or(report, &["toneAnalysis", "tone_analysis"], empty_doc()),
        engagement_level: truthy_or(report, &["engagementLevel", "engagement_level"], empty_doc()),
        action_intentions: defined_or(report, &["actionIntentions", "action_intentions"], Bson::Null),
        verdict: defined_or(report, &["verdict"], Bson::Null),
        contrasting_opinions: defined_or(
            report,
            &["contrastingOpinions", "contrasting_opinions"],
            Bson::Null,
        ),
        brand_recall: truthy_or(report, &["brandRecall", "brand_recall"], empty_doc()),
        summary: defined_or(report, &["summary"], Bson::Null),
        title: defined_or(report, &["title"], title_default),
        category: defined_or(report, &["category"], Bson::Null),
        category_report: truthy_or(report, &["category_report"], empty_doc()),
        status: defined_or(report, &["status"], Bson::Int32(2)),
        message: defined_or(report, &["message"], message_default),
        created_at: date_from(report.get("createdAt"), project.get("createdAt")),
        updated_at: date_from(report.get("updatedAt"), project.get("updatedAt")),
        extra: copy_except(report, REPORT_CONSUMED_KEYS),
    };
    Ok(Some(bson::to_document(&record)?))
}

struct SplitVisitor {
    index: ReferenceIndex,
    counters: RunCounters,
}

#[async_trait]
impl DocumentVisitor for SplitVisitor {
    async fn visit(&mut self, ctx: &ExecutionContext, project: Document) -> Result<()> {
        let id = project_id(&project)?.clone();

        let transformed = transform_project(&project);
        ctx.upsert(&mut self.counters, PROJECTS, &id, transformed).await?;

        match build_insight(&project, &self.index)? {
            Some(insight) => {
                let insight_id = derive_for_role(&id, DerivedRole::Insight);
                ctx.upsert(&mut self.counters, INSIGHTS, &Bson::ObjectId(insight_id), insight)
                    .await?;
            }
            None => self.counters.bump("insights_suppressed"),
        }

        if let Some(report) = build_report(&project)? {
            let report_id = derive_for_role(&id, DerivedRole::Report);
            ctx.upsert(&mut self.counters, REPORTS, &Bson::ObjectId(report_id), report)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Migration for ProjectsSplit {
    fn id(&self) -> &'static str {
        "0003-projects_insights_reports"
    }

    fn description(&self) -> &'static str {
        "Split legacy project documents into projects, insights, and reports collections."
    }

    async fn up(&self, ctx: &ExecutionContext) -> Result<RunCounters> {
        let index = ReferenceIndexBuilder::new(UNIT_USAGE, ctx.batch_size)
            .fields(UNIT_USAGE_REFERENCE_FIELDS.iter().copied())
            .build(ctx.source.as_ref())
            .await?;

        let mut visitor = SplitVisitor {
            index,
            counters: RunCounters::new(),
        };
        let summary = BatchCursorProcessor::new(PROJECTS).run(ctx, &mut visitor).await?;

        let mut counters = visitor.counters;
        counters.add_processed(summary.processed);
        info!(
            "Finished migrating projects. Projects: {}, insights: {}, reports: {}.",
            counters.upserts(PROJECTS),
            counters.upserts(INSIGHTS),
            counters.upserts(REPORTS)
        );
        Ok(counters)
    }
}
