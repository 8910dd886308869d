//! Copying feedback to the system clipboard.

use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;

/// Write plain text through the async Clipboard API.
pub async fn write_text(text: &str) -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let promise = window.navigator().clipboard().write_text(text);
    JsFuture::from(promise).await?;
    Ok(())
}

/// Fire-and-forget copy. Failures are logged.
pub fn copy_text(text: String) {
    wasm_bindgen_futures::spawn_local(async move {
        if let Err(e) = write_text(&text).await {
            tracing::warn!("Clipboard write failed: {:?}", e);
        }
    });
}
