//! Terminal states of an upload request

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use minijinja::{Value, context};

use super::pages::{self, Pages};
use crate::matching::MatchReport;

/// Where a rejected upload is sent back to
pub const FORM_PATH: &str = "/";

/// Data shown on the result page
#[derive(Debug, Clone)]
pub struct MatchPage {
    /// Public URL of the composite image
    pub result_image: String,
    pub report: MatchReport,
    pub backend: &'static str,
    pub generated_at: String,
}

/// How an upload request ended
#[derive(Debug, Clone)]
pub enum UploadOutcome {
    Succeeded(MatchPage),
    Failed { status: StatusCode, message: String },
    /// The form was incomplete; redirect to it without a diagnostic
    Rejected,
}

impl UploadOutcome {
    pub fn failed(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Failed {
            status,
            message: message.into(),
        }
    }

    pub fn respond(self, pages: &Pages) -> Response {
        match self {
            Self::Succeeded(page) => render(
                pages,
                StatusCode::OK,
                pages::RESULT,
                context! {
                    // built from a generated file name, emitted unescaped
                    result_image => Value::from_safe_string(page.result_image),
                    matches => page.report.matches,
                    origin_keypoints => page.report.origin_keypoints,
                    concat_keypoints => page.report.concat_keypoints,
                    backend => page.backend,
                    generated_at => page.generated_at,
                },
            ),
            Self::Failed { status, message } => render(
                pages,
                status,
                pages::ERROR,
                context! { error_message => message },
            ),
            Self::Rejected => Redirect::to(FORM_PATH).into_response(),
        }
    }
}

pub fn render(pages: &Pages, status: StatusCode, name: &str, ctx: Value) -> Response {
    match pages.render(name, ctx) {
        Ok(body) => (status, Html(body)).into_response(),
        Err(err) => {
            log::error!("Failed to render {}: {}", name, err);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}
