//! Web app manifest with icons rendered from `[build.manifest].icon`.

use super::EmitError;
use crate::config::{ImageFormat, SiteConfig};
use crate::imaging::{ImageProcessor, VariantSpec};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    name: &'a str,
    short_name: &'a str,
    start_url: &'a str,
    background_color: &'a str,
    theme_color: &'a str,
    display: &'a str,
    icons: Vec<Icon>,
}

#[derive(Debug, Serialize)]
struct Icon {
    src: String,
    sizes: String,
    #[serde(rename = "type")]
    mime: &'static str,
}

pub fn render(config: &SiteConfig, images: &ImageProcessor) -> Result<Vec<u8>, EmitError> {
    let manifest_config = &config.build.manifest;
    let name = manifest_config.name.as_deref().unwrap_or(&config.base.title);

    let icons = match &manifest_config.icon {
        Some(icon) => {
            let specs: Vec<VariantSpec> = manifest_config
                .icon_sizes
                .iter()
                .map(|&width| VariantSpec {
                    width,
                    format: ImageFormat::Png,
                    quality: config.build.images.quality,
                })
                .collect();
            images
                .process(icon, &specs)?
                .into_iter()
                .map(|variant| Icon {
                    src: variant.url(),
                    sizes: format!("{}x{}", variant.width, variant.height),
                    mime: variant.format.mime(),
                })
                .collect()
        }
        None => Vec::new(),
    };

    let manifest = Manifest {
        name,
        short_name: manifest_config.short_name.as_deref().unwrap_or(name),
        start_url: &manifest_config.start_url,
        background_color: &manifest_config.background_color,
        theme_color: &manifest_config.theme_color,
        display: &manifest_config.display,
        icons,
    };

    let json = if config.build.minify {
        serde_json::to_vec(&manifest)?
    } else {
        serde_json::to_vec_pretty(&manifest)?
    };
    Ok(json)
}
