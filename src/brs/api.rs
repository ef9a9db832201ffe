//! BRS mobile JSON API client.

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::header;
use reqwest::redirect::Policy;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::brs::errors::BrsApiError;
use crate::brs::json::parse_json_with_context;
use crate::brs::middleware::TransactionLogMiddleware;
use crate::brs::models::{
    CardType, ControlAction, Discipline, DisciplineQuery, FailureWrite, MarkType, MarkWrite,
    PortalStudent, StudentStatus,
};
use crate::brs::session::Session;
use crate::marks::names::decode_html_entities;
use crate::marks::portal::{DisciplineDirectory, Portal, ServiceResult};
use crate::marks::values::{FailureCode, format_mark};

pub const DEFAULT_BRS_BASE_URL: &str = "https://brs.urfu.ru/mvc/";

const DISCIPLINES_PATH: &str = "mobile/discipline/fetch";
const CONTROL_ACTIONS_PATH: &str = "mobile/discipline/controlActions";
const STUDENT_MARKS_PATH: &str = "mobile/studentMarks/fetch";
const PUT_MARK_PATH: &str = "mobile/studentMarks/put";
const PUT_FAILURE_PATH: &str = "mobile/failure/put";

const PAGE_SIZE: usize = 1000;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisciplinePage {
    #[serde(default)]
    content: Vec<DisciplineDto>,
    #[serde(default)]
    total: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisciplineDto {
    discipline: String,
    group: String,
    group_id: String,
    group_history_id: String,
    discipline_load: String,
    #[serde(default)]
    is_module: bool,
}

impl From<DisciplineDto> for Discipline {
    fn from(dto: DisciplineDto) -> Self {
        Discipline {
            name: decode_html_entities(&dto.discipline),
            group: dto.group,
            group_id: dto.group_id,
            group_history_id: dto.group_history_id,
            discipline_load_id: dto.discipline_load,
            is_module: dto.is_module,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ControlActionDto {
    uuid: String,
    control_action: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentMarksDto {
    student_uuid: String,
    full_name: String,
    status: String,
    group_uuid: String,
    group_history_id: String,
    discipline_load: String,
    #[serde(default)]
    failure: Option<i32>,
    #[serde(default)]
    marks: Vec<MarkDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkDto {
    control_action: String,
    /// Either a number or a locale-formatted string.
    #[serde(default)]
    mark: serde_json::Value,
}

impl StudentMarksDto {
    fn into_student(self, card_type: CardType) -> PortalStudent {
        let marks = self
            .marks
            .into_iter()
            .filter_map(|m| {
                let raw = match m.mark {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                Some((m.control_action, raw))
            })
            .collect();

        PortalStudent {
            student_id: self.student_uuid,
            full_name: decode_html_entities(&self.full_name),
            status: StudentStatus::from_portal_str(&self.status),
            group_id: self.group_uuid,
            group_history_id: self.group_history_id,
            card_type,
            discipline_load_id: self.discipline_load,
            failure: self.failure.and_then(FailureCode::from_code),
            marks,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PutMarkBody<'a> {
    student: &'a str,
    control_action: &'a str,
    mark: String,
    group_history_id: &'a str,
    card_type: &'static str,
    discipline_load: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PutFailureBody<'a> {
    student: &'a str,
    discipline_load: &'a str,
    group_history_id: &'a str,
    failure: i32,
    card_type: &'static str,
}

/// Client for the BRS grading portal, bound to one session.
pub struct BrsApi {
    http: ClientWithMiddleware,
    base_url: Url,
    session: Session,
}

impl BrsApi {
    pub fn new(base_url: &str, session: Session, timeout: Duration) -> anyhow::Result<Self> {
        let mut base_url = Url::parse(base_url).context("Invalid BRS base URL")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        // Redirects are how the portal signals an expired session; keep them visible.
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .build()
            .context("Failed to build BRS HTTP client")?;
        let http = ClientBuilder::new(client)
            .with(TransactionLogMiddleware)
            .build();

        info!(base_url = %base_url, login = session.login(), "BRS client ready");
        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    fn url(&self, path: &str) -> Result<Url, BrsApiError> {
        self.base_url
            .join(path)
            .with_context(|| format!("Invalid BRS path {path}"))
            .map_err(BrsApiError::RequestFailed)
    }

    /// Map status and content type to the error taxonomy, returning the body.
    async fn read_body(response: reqwest::Response) -> Result<(u16, String, String), BrsApiError> {
        let status = response.status();
        let url = response.url().to_string();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            return Err(BrsApiError::InvalidSession(format!(
                "redirected to '{location}' ({status})"
            )));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(BrsApiError::InvalidSession(format!("{status} from {url}")));
        }

        let is_html = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/html"));
        let body = response
            .text()
            .await
            .map_err(|e| BrsApiError::Unavailable(anyhow!(e).context("Failed to read BRS body")))?;

        if status.is_server_error() {
            return Err(BrsApiError::Unavailable(anyhow!("BRS returned {status}")));
        }
        if !status.is_success() {
            return Err(BrsApiError::RequestFailed(anyhow!(
                "BRS returned {status} for {url}: {body}"
            )));
        }
        if is_html {
            return Err(BrsApiError::InvalidSession(
                "login page returned instead of data".to_string(),
            ));
        }

        Ok((status.as_u16(), url, body))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, BrsApiError> {
        let mut url = self.url(path)?;
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));

        let response = self
            .http
            .get(url)
            .header(header::COOKIE, self.session.cookie_header())
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let (status, url, body) = Self::read_body(response).await?;

        parse_json_with_context(&body).map_err(|source| BrsApiError::ParseFailed {
            status,
            url,
            source,
        })
    }

    async fn put_json<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<(), BrsApiError> {
        let response = self
            .http
            .put(self.url(path)?)
            .header(header::COOKIE, self.session.cookie_header())
            .json(body)
            .send()
            .await?;
        Self::read_body(response).await?;
        Ok(())
    }

    fn group_query(
        discipline: &Discipline,
        card_type: CardType,
        mark_type: MarkType,
    ) -> Vec<(&'static str, String)> {
        vec![
            ("disciplineLoad", discipline.discipline_load_id.clone()),
            ("groupUUID", discipline.group_id.clone()),
            ("cardType", card_type.as_str().to_string()),
            ("markType", mark_type.as_str().to_string()),
        ]
    }
}

#[async_trait]
impl DisciplineDirectory for BrsApi {
    async fn fetch_disciplines(&self, query: &DisciplineQuery) -> ServiceResult<Vec<Discipline>> {
        let mut disciplines = Vec::new();
        let mut page = 1usize;

        loop {
            let params = [
                ("year", query.year.to_string()),
                ("termType", query.term.to_string()),
                ("course", query.course.to_string()),
                ("isModule", query.is_module.to_string()),
                ("page", page.to_string()),
                ("pageSize", PAGE_SIZE.to_string()),
                ("search", String::new()),
            ];
            let batch: DisciplinePage = self.get_json(DISCIPLINES_PATH, &params).await?;
            let received = batch.content.len();
            disciplines.extend(batch.content.into_iter().map(Discipline::from));

            if received < PAGE_SIZE || disciplines.len() >= batch.total {
                break;
            }
            page += 1;
        }

        debug!(
            year = query.year,
            term = query.term,
            course = query.course,
            count = disciplines.len(),
            "Fetched disciplines"
        );
        Ok(disciplines)
    }
}

#[async_trait]
impl Portal for BrsApi {
    async fn fetch_control_actions(
        &self,
        discipline: &Discipline,
        card_type: CardType,
        mark_type: MarkType,
    ) -> ServiceResult<Vec<ControlAction>> {
        let query = Self::group_query(discipline, card_type, mark_type);
        let actions: Vec<ControlActionDto> = self.get_json(CONTROL_ACTIONS_PATH, &query).await?;
        Ok(actions
            .into_iter()
            .map(|dto| ControlAction {
                id: dto.uuid,
                display_name: decode_html_entities(&dto.control_action),
                card_type,
            })
            .collect())
    }

    async fn fetch_student_marks(
        &self,
        discipline: &Discipline,
        card_type: CardType,
        mark_type: MarkType,
    ) -> ServiceResult<Vec<PortalStudent>> {
        let mut query = Self::group_query(discipline, card_type, mark_type);
        query.push(("isTotal", "false".to_string()));
        query.push(("showActiveStudents", "false".to_string()));

        let students: Vec<StudentMarksDto> = self.get_json(STUDENT_MARKS_PATH, &query).await?;
        Ok(students
            .into_iter()
            .map(|dto| dto.into_student(card_type))
            .collect())
    }

    async fn put_mark(&self, write: &MarkWrite) -> ServiceResult<()> {
        let body = PutMarkBody {
            student: &write.student_id,
            control_action: &write.control_action_id,
            mark: format_mark(write.mark),
            group_history_id: &write.group_history_id,
            card_type: write.card_type.as_str(),
            discipline_load: &write.discipline_load_id,
        };
        self.put_json(PUT_MARK_PATH, &body).await?;
        Ok(())
    }

    async fn put_failure(&self, write: &FailureWrite) -> ServiceResult<()> {
        let body = PutFailureBody {
            student: &write.student_id,
            discipline_load: &write.discipline_load_id,
            group_history_id: &write.group_history_id,
            failure: write.failure.code(),
            card_type: write.card_type.as_str(),
        };
        self.put_json(PUT_FAILURE_PATH, &body).await?;
        Ok(())
    }
}
