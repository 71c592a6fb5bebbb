pub mod build;

pub async fn health() -> &'static str {
    "ok"
}
