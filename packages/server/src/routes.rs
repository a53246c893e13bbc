//! HTTP handlers for the three publish modes. Everything here is request
//! and response shaping; pipeline semantics live in the silopub crate.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{Form, Json};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use silopub::error::PublishError;
use silopub::types::{AccountId, PublishMode, PublishOutcome, PublishRequest};

use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct PublishForm {
    pub source: String,
    pub target: String,
    /// Logged-in account, sent by the interactive and preview pages
    pub account: Option<Uuid>,
    pub bridgy_omit_link: Option<String>,
    pub bridgy_ignore_formatting: Option<String>,
}

impl PublishForm {
    fn to_request(&self, mode: PublishMode) -> PublishRequest {
        PublishRequest {
            source: self.source.clone(),
            target: self.target.clone(),
            mode,
            expected_account: self.account.map(AccountId),
            omit_link: self.bridgy_omit_link.as_deref().map(param_bool),
            ignore_formatting: self.bridgy_ignore_formatting.is_some(),
        }
    }
}

/// Form booleans: a bare parameter counts as true, anything but an
/// explicit false/0 is true
fn param_bool(value: &str) -> bool {
    !matches!(value, "false" | "False" | "0")
}

pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

/// Direct webmention call: JSON in both directions
pub async fn webmention_handler(
    State(state): State<AppState>,
    Form(form): Form<PublishForm>,
) -> Response {
    match state
        .publisher
        .publish(&form.to_request(PublishMode::Webmention))
        .await
    {
        Ok(PublishOutcome::Published { creation, .. }) => Json(json!({
            "id": creation.id,
            "url": creation.url,
            "content": creation.content,
        }))
        .into_response(),
        Ok(_) => error_response(PublishError::Internal(anyhow::anyhow!(
            "webmention mode produced no creation"
        ))),
        Err(err) => error_response(err),
    }
}

/// Dry run: renders an HTML fragment embedding the would-be output
pub async fn preview_handler(
    State(state): State<AppState>,
    Form(form): Form<PublishForm>,
) -> Response {
    match state
        .publisher
        .publish(&form.to_request(PublishMode::Preview))
        .await
    {
        Ok(PublishOutcome::Previewed {
            description,
            include_link,
            ..
        }) => {
            let echo = json!({
                "bridgy_omit_link": !include_link,
                "source_url": form.source,
                "target_url": form.target,
            });
            Html(format!(
                "<div class=\"preview\">\n{}\n</div>\n<input type=\"hidden\" name=\"state\" value=\"{}\" />",
                description,
                html_escape(&echo.to_string()),
            ))
            .into_response()
        }
        Ok(_) => error_response(PublishError::Internal(anyhow::anyhow!(
            "preview mode produced a creation"
        ))),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct InteractiveQuery {
    pub source: String,
    pub account: Option<Uuid>,
}

/// Browser flow completion: publish, then bounce back to the account page
/// with the outcome in the URL fragment
pub async fn interactive_handler(
    State(state): State<AppState>,
    Path(silo): Path<String>,
    Query(query): Query<InteractiveQuery>,
) -> Response {
    let request = PublishRequest {
        source: query.source,
        target: format!("{}/publish/{}", state.endpoint, silo),
        mode: PublishMode::Interactive,
        expected_account: query.account.map(AccountId),
        omit_link: None,
        ignore_formatting: false,
    };

    match state.publisher.publish(&request).await {
        Ok(PublishOutcome::Published {
            account, creation, ..
        }) => {
            let account_page = format!(
                "{}/{}/{}",
                state.endpoint,
                silo,
                account.domains.first().map(String::as_str).unwrap_or("")
            );
            let message = format!("Done! <a href=\"{}\">Click here to view.</a>", creation.url);
            redirect_with_message(&account_page, &message)
        }
        Ok(_) => redirect_with_message(&state.endpoint, "Something went wrong. Please try again."),
        Err(err) => redirect_with_message(&state.endpoint, &err.to_string()),
    }
}

/// Put the status message in the fragment, where the account page's script
/// picks it up
fn redirect_with_message(base: &str, message: &str) -> Response {
    let uri = format!("{}#!{}", base, urlencoding::encode(message));
    Redirect::to(&uri).into_response()
}

fn error_response(err: PublishError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    tracing::info!(status = %status, error = %err, "Publish request failed");
    (status, Json(json!({"error": err.to_string()}))).into_response()
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_and_truthy_params_are_true() {
        assert!(param_bool(""));
        assert!(param_bool("true"));
        assert!(param_bool("True"));
        assert!(!param_bool("false"));
        assert!(!param_bool("False"));
        assert!(!param_bool("0"));
    }

    #[test]
    fn state_echo_is_escaped() {
        assert_eq!(
            html_escape(r#"{"bridgy_omit_link":true}"#),
            "{&quot;bridgy_omit_link&quot;:true}"
        );
    }
}
