//! `iframes` stage: fixed-size embeds → fluid aspect-ratio boxes.
//!
//! An `<iframe>` with numeric `width` and `height` is wrapped in a box whose
//! `padding-bottom` holds the aspect ratio; the frame itself is absolutely
//! positioned to fill it. Frames without both dimensions pass through.

use super::{Artifact, Transformer, hash_config};
use crate::content::ContentNode;
use crate::context::BuildContext;
use crate::utils::xml::{
    XmlWriter, create_xml_reader, create_xml_writer, elem_name, get_attr, into_string, write_end,
    write_start,
};
use anyhow::Result;
use quick_xml::events::{BytesStart, Event};

const WRAPPER_CLASS: &str = "responsive-iframe";
const WRAPPER_BASE_STYLE: &str = "position: relative; height: 0; overflow: hidden;";
const IFRAME_STYLE: &str = "position: absolute; top: 0; left: 0; width: 100%; height: 100%;";

pub struct Iframes;

impl Transformer for Iframes {
    fn name(&self) -> &str {
        "iframes"
    }

    fn fingerprint(&self, ctx: &BuildContext, hasher: &mut blake3::Hasher) -> Result<()> {
        hash_config(hasher, &ctx.config.build.iframes)
    }

    fn transform(&self, _node: &ContentNode, input: &Artifact, ctx: &BuildContext) -> Result<Artifact> {
        let wrapper_style = &ctx.config.build.iframes.wrapper_style;
        let mut reader = create_xml_reader(input.html.as_bytes());
        let mut writer = create_xml_writer(input.html.len());
        // One entry per open <iframe>: whether it was wrapped.
        let mut open: Vec<bool> = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(elem)) if elem.name().as_ref() == b"iframe" => {
                    match aspect_ratio(&elem) {
                        Some(ratio) => {
                            write_wrapper_start(&mut writer, ratio, wrapper_style)?;
                            writer.write_event(Event::Start(restyle(&elem)))?;
                            open.push(true);
                        }
                        None => {
                            writer.write_event(Event::Start(elem))?;
                            open.push(false);
                        }
                    }
                }
                Ok(Event::Empty(elem)) if elem.name().as_ref() == b"iframe" => {
                    match aspect_ratio(&elem) {
                        Some(ratio) => {
                            write_wrapper_start(&mut writer, ratio, wrapper_style)?;
                            writer.write_event(Event::Empty(restyle(&elem)))?;
                            write_end(&mut writer, "div")?;
                        }
                        None => writer.write_event(Event::Empty(elem))?,
                    }
                }
                Ok(Event::End(elem)) if elem.name().as_ref() == b"iframe" => {
                    writer.write_event(Event::End(elem))?;
                    if open.pop() == Some(true) {
                        write_end(&mut writer, "div")?;
                    }
                }
                Ok(Event::Eof) => break,
                Ok(event) => writer.write_event(event)?,
                Err(e) => anyhow::bail!(
                    "HTML parse error at position {}: {:?}",
                    reader.error_position(),
                    e
                ),
            }
        }

        Ok(input.with_html(into_string(writer)))
    }
}

fn dimension(elem: &BytesStart<'_>, name: &str) -> Option<f64> {
    get_attr(elem, name)?
        .trim()
        .trim_end_matches("px")
        .parse::<f64>()
        .ok()
        .filter(|v| *v > 0.0)
}

/// `height / width` as a percentage.
fn aspect_ratio(elem: &BytesStart<'_>) -> Option<f64> {
    let width = dimension(elem, "width")?;
    let height = dimension(elem, "height")?;
    Some(height / width * 100.0)
}

/// Percentage with at most four decimals and no trailing zeros.
fn format_percent(value: f64) -> String {
    let s = format!("{value:.4}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    format!("{s}%")
}

fn write_wrapper_start(
    writer: &mut XmlWriter,
    ratio: f64,
    wrapper_style: &str,
) -> Result<()> {
    let mut style = format!("padding-bottom: {}; {WRAPPER_BASE_STYLE}", format_percent(ratio));
    if !wrapper_style.trim().is_empty() {
        style.push(' ');
        style.push_str(wrapper_style.trim());
    }
    write_start(writer, "div", &[("class", WRAPPER_CLASS), ("style", style.as_str())])
}

/// Drop fixed dimensions and inline style, then add the fill style.
fn restyle(elem: &BytesStart<'_>) -> BytesStart<'static> {
    let mut new_elem = BytesStart::new(elem_name(elem));
    for attr in elem.html_attributes().flatten() {
        if matches!(attr.key.as_ref(), b"width" | b"height" | b"style") {
            continue;
        }
        new_elem.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
    }
    new_elem.push_attribute(("style", IFRAME_STYLE));
    new_elem
}
