use axum::http::{HeaderMap, header};
use regex::Regex;
use std::sync::LazyLock;

static BEARER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Bearer (.+)$").expect("bearer pattern is valid"));

/// The token of an `Authorization: Bearer <token>` header.
///
/// A missing, non-ASCII or differently-schemed header yields `None`; the
/// orchestrator turns that into an authentication failure.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    BEARER
        .captures(value.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|token| !token.is_empty())
}
