use {
    base64::{Engine as _, engine::general_purpose::STANDARD},
    qrcode::{QrCode, render::svg},
};

use crate::adapter::AdapterError;

/// Render a pairing payload as a QR code, returned as an SVG data URL
/// ready for direct embedding in an `<img>` tag.
pub fn data_url(payload: &str) -> Result<String, AdapterError> {
    let code =
        QrCode::new(payload.as_bytes()).map_err(|e| AdapterError::Render(e.to_string()))?;
    let image = code.render::<svg::Color>().min_dimensions(256, 256).build();
    Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(image)))
}
