use std::path::Path;

use dronelink_types::Picture;
use image::{ImageFormat, RgbImage};
use log::info;

use crate::{ClientError, ClientResult};

/// Сохраняет кадр в PNG.
pub fn save_snapshot(
    picture: &Picture,
    path: impl AsRef<Path>,
) -> ClientResult<()> {
    let path = path.as_ref();

    let img = RgbImage::from_raw(picture.width, picture.height, picture.rgb.clone()).ok_or_else(
        || {
            ClientError::Snapshot(format!(
                "pixel buffer of {} bytes does not match {}x{}",
                picture.rgb.len(),
                picture.width,
                picture.height
            ))
        },
    )?;

    img.save_with_format(path, ImageFormat::Png)
        .map_err(|e| ClientError::Snapshot(e.to_string()))?;

    info!(
        "Snapshot {}x{} saved to {}",
        picture.width,
        picture.height,
        path.display()
    );

    Ok(())
}
