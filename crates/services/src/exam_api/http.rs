use std::env;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use exam_core::model::{
    Choice, ChoiceLabel, ExamId, Question, QuestionId, QuestionSet, SubmissionResult,
};

use super::{QuestionProvider, SubmissionPayload, SubmissionService};
use crate::error::{ConfigError, ExamApiError};

pub const DEFAULT_BASE_URL: &str = "https://backend-onlinesystem.onrender.com/api/exam";
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct ExamApiConfig {
    pub base_url: Url,
    pub access_token: Option<String>,
    pub load_timeout: Duration,
    pub submit_timeout: Duration,
}

impl ExamApiConfig {
    /// Build a config from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    ///
    /// Reads `EXAM_API_BASE_URL`, `EXAM_API_TOKEN`, `EXAM_API_LOAD_TIMEOUT_SECS`
    /// and `EXAM_API_SUBMIT_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup("EXAM_API_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let access_token = lookup("EXAM_API_TOKEN")
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());
        let load_timeout = secs_or(&lookup, "EXAM_API_LOAD_TIMEOUT_SECS", DEFAULT_LOAD_TIMEOUT)?;
        let submit_timeout =
            secs_or(&lookup, "EXAM_API_SUBMIT_TIMEOUT_SECS", DEFAULT_SUBMIT_TIMEOUT)?;

        Ok(Self {
            base_url: parse_base_url(&base_url)?,
            access_token,
            load_timeout,
            submit_timeout,
        })
    }

    /// # Errors
    ///
    /// Returns `ConfigError::InvalidBaseUrl` if `raw` is not an absolute URL.
    pub fn with_base_url(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.base_url = parse_base_url(raw)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidBaseUrl {
        raw: raw.to_string(),
        source,
    })
}

fn secs_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidNumber { key, raw }),
    }
}

/// reqwest-backed client for the exam backend.
#[derive(Clone)]
pub struct HttpExamApi {
    client: Client,
    config: ExamApiConfig,
}

impl HttpExamApi {
    #[must_use]
    pub fn new(config: ExamApiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ExamApiConfig {
        &self.config
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ExamApiError> {
        let token = self
            .config
            .access_token
            .as_deref()
            .ok_or(ExamApiError::MissingCredential)?;
        Ok(request.bearer_auth(token))
    }
}

#[async_trait]
impl QuestionProvider for HttpExamApi {
    async fn load_exam(&self, exam_id: ExamId) -> Result<QuestionSet, ExamApiError> {
        let url = self.config.endpoint(&format!("exams/{exam_id}/detail"));
        debug!(%exam_id, %url, "loading exam detail");

        let request = self
            .authorized(self.client.get(url))?
            .timeout(self.config.load_timeout);
        let response = ensure_success(request.send().await?).await?;

        let body: ExamDetailResponse = response.json().await?;
        body.into_question_set()
    }
}

#[async_trait]
impl SubmissionService for HttpExamApi {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<SubmissionResult, ExamApiError> {
        let url = self.config.endpoint("exam/submit");
        debug!(exam_id = %payload.exam_id, answers = payload.answers.len(), "submitting exam");

        let request = self
            .authorized(self.client.post(url))?
            .timeout(self.config.submit_timeout)
            .json(&SubmitRequest::from_payload(payload));
        let response = ensure_success(request.send().await?).await?;

        let body: SubmitResponse = response.json().await?;
        body.into_result()
    }
}

async fn ensure_success(response: Response) -> Result<Response, ExamApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.message);
    Err(ExamApiError::HttpStatus { status, message })
}

//
// ─── WIRE FORMAT ───────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExamDetailResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    id_ex: Option<u64>,
    #[serde(default)]
    name_ex: String,
    /// Minutes.
    #[serde(default)]
    duration: Option<u64>,
    #[serde(default)]
    total_ques: Option<usize>,
    #[serde(default)]
    questions: Vec<QuestionDto>,
}

#[derive(Debug, Deserialize)]
struct QuestionDto {
    id_ques: u64,
    ques_text: String,
    #[serde(default)]
    ans_a: Option<String>,
    #[serde(default)]
    ans_b: Option<String>,
    #[serde(default)]
    ans_c: Option<String>,
    #[serde(default)]
    ans_d: Option<String>,
}

impl QuestionDto {
    fn into_question(self) -> Result<Question, ExamApiError> {
        let choices = ChoiceLabel::ALL
            .into_iter()
            .zip([self.ans_a, self.ans_b, self.ans_c, self.ans_d])
            .filter_map(|(label, text)| {
                text.filter(|t| !t.trim().is_empty())
                    .map(|t| Choice::new(label, t))
            })
            .collect();
        Question::new(QuestionId::new(self.id_ques), self.ques_text, choices)
            .map_err(|e| ExamApiError::InvalidPayload(e.into()))
    }
}

impl ExamDetailResponse {
    fn into_question_set(self) -> Result<QuestionSet, ExamApiError> {
        if !self.success {
            return Err(ExamApiError::Rejected(
                self.message.unwrap_or_else(|| "exam could not be loaded".into()),
            ));
        }
        let exam_id = ExamId::new(self.id_ex.ok_or(ExamApiError::MissingField("id_ex"))?);
        let minutes = self.duration.ok_or(ExamApiError::MissingField("duration"))?;
        let duration = Duration::from_secs(minutes.saturating_mul(60));

        let questions = self
            .questions
            .into_iter()
            .map(QuestionDto::into_question)
            .collect::<Result<Vec<_>, _>>()?;

        let set = match self.total_ques {
            Some(declared) => {
                QuestionSet::with_declared_total(exam_id, self.name_ex, questions, duration, declared)
            }
            None => QuestionSet::new(exam_id, self.name_ex, questions, duration),
        };
        set.map_err(|e| ExamApiError::InvalidPayload(e.into()))
    }
}

#[derive(Debug, Serialize)]
struct SubmitRequest {
    exam_id: u64,
    answers: Vec<SubmitAnswer>,
    start_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct SubmitAnswer {
    id_ques: u64,
    answer: String,
}

impl SubmitRequest {
    fn from_payload(payload: &SubmissionPayload) -> Self {
        Self {
            exam_id: payload.exam_id.value(),
            answers: payload
                .answers
                .iter()
                .map(|answer| SubmitAnswer {
                    id_ques: answer.question_id.value(),
                    answer: answer.chosen_value.clone(),
                })
                .collect(),
            start_time: payload.started_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    result: Option<SubmissionResult>,
}

impl SubmitResponse {
    fn into_result(self) -> Result<SubmissionResult, ExamApiError> {
        if !self.success {
            return Err(ExamApiError::Rejected(
                self.message.unwrap_or_else(|| "submission failed".into()),
            ));
        }
        self.result.ok_or(ExamApiError::MissingField("result"))
    }
}
