//! Scene Clone Builder - Sanitized Copies for Rendering
//!
//! Two purposes share one builder:
//! - `Full`: the scene as the user sees it, minus editor chrome.
//! - `WallMask`: walls in pure black, door/window openings in pure white,
//!   everything else removed.

use crate::config::LayerIds;
use crate::document::{Element, Node, SceneDocument, SVG_NS, XLINK_NS};
use crate::geometry::Viewport;

pub const WALL_MASK_INK: &str = "#000000";
pub const OPENING_INK: &str = "#ffffff";

const SHAPES: &[&str] = &["path", "rect", "circle", "ellipse", "line", "polyline", "polygon"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPurpose {
    Full,
    WallMask,
}

/// Render intent for one sanitized clone.
#[derive(Debug, Clone)]
pub struct CloneSpec {
    pub purpose: RenderPurpose,
    pub background: String,
    pub hide_text: bool,
}

impl CloneSpec {
    pub fn full(background: impl Into<String>) -> Self {
        Self { purpose: RenderPurpose::Full, background: background.into(), hide_text: true }
    }

    pub fn wall_mask(background: impl Into<String>) -> Self {
        Self { purpose: RenderPurpose::WallMask, background: background.into(), hide_text: true }
    }
}

/// A disposable, render-ready copy of the scene.
#[derive(Debug, Clone)]
pub struct SanitizedScene {
    pub purpose: RenderPurpose,
    pub viewport: Viewport,
    pub document: SceneDocument,
}

impl SanitizedScene {
    pub fn to_markup(&self) -> String {
        self.document.to_markup()
    }
}

pub fn build_clone(
    scene: &SceneDocument,
    viewport: Viewport,
    spec: &CloneSpec,
    layers: &LayerIds,
) -> SanitizedScene {
    let mut document = scene.clone();
    let root = document.root_mut();

    root.set_attr("xmlns", SVG_NS);
    if root.attr("xmlns:xlink").is_none() {
        root.set_attr("xmlns:xlink", XLINK_NS);
    }
    root.set_attr("viewBox", viewport.to_view_box());
    root.set_attr("width", viewport.w.to_string());
    root.set_attr("height", viewport.h.to_string());
    root.set_attr("preserveAspectRatio", "xMidYMid meet");
    root.remove_attr("style");

    for overlay in &layers.editor_overlays {
        root.remove_by_id(overlay);
    }
    if spec.hide_text {
        root.remove_by_id(&layers.text);
    }

    if spec.purpose == RenderPurpose::WallMask {
        for id in [&layers.room, &layers.fixtures, &layers.furniture, &layers.text] {
            root.remove_by_id(id);
        }
        if let Some(wall) = root.find_by_id_mut(&layers.wall) {
            recolor(wall, WALL_MASK_INK, false, false);
        }
        if let Some(carpentry) = root.find_by_id_mut(&layers.carpentry) {
            recolor(carpentry, OPENING_INK, false, true);
        }
    }

    let background = Element::new("rect")
        .with_attr("x", viewport.x.to_string())
        .with_attr("y", viewport.y.to_string())
        .with_attr("width", viewport.w.to_string())
        .with_attr("height", viewport.h.to_string())
        .with_attr("fill", spec.background.clone());
    root.children.insert(0, Node::Element(background));

    SanitizedScene { purpose: spec.purpose, viewport, document }
}

/// Repaints every non-`none` fill and stroke under `element` with `ink`.
///
/// Shapes without a fill of their own inherit the SVG default (black),
/// which counts as painted unless an ancestor set `fill="none"`.
fn recolor(element: &mut Element, ink: &str, inherited_fill_none: bool, opaque: bool) {
    let own_fill = paint_value(element, "fill");
    let fill_none = match own_fill.as_deref() {
        Some("none") => true,
        Some(_) => false,
        None => inherited_fill_none,
    };

    if own_fill.as_deref().is_some_and(|v| v != "none")
        || (own_fill.is_none() && !fill_none && SHAPES.contains(&element.local_name()))
    {
        set_paint(element, "fill", ink);
    }
    if paint_value(element, "stroke").is_some_and(|v| v != "none") {
        set_paint(element, "stroke", ink);
    }
    if opaque {
        for prop in ["opacity", "fill-opacity", "stroke-opacity"] {
            set_paint(element, prop, "1");
        }
    }

    for child in &mut element.children {
        if let Node::Element(e) = child {
            recolor(e, ink, fill_none, opaque);
        }
    }
}

/// Presentation value from `style` (which wins) or the attribute.
fn paint_value(element: &Element, prop: &str) -> Option<String> {
    style_declarations(element)
        .into_iter()
        .find(|(k, _)| k == prop)
        .map(|(_, v)| v)
        .or_else(|| element.attr(prop).map(|v| v.trim().to_string()))
}

fn set_paint(element: &mut Element, prop: &str, value: &str) {
    element.set_attr(prop, value);

    let declarations = style_declarations(element);
    if declarations.iter().any(|(k, _)| k == prop) {
        let style = declarations
            .into_iter()
            .map(|(k, v)| if k == prop { format!("{}:{}", k, value) } else { format!("{}:{}", k, v) })
            .collect::<Vec<_>>()
            .join(";");
        element.set_attr("style", style);
    }
}

fn style_declarations(element: &Element) -> Vec<(String, String)> {
    element
        .attr("style")
        .map(|style| {
            style
                .split(';')
                .filter_map(|decl| {
                    let (k, v) = decl.split_once(':')?;
                    Some((k.trim().to_string(), v.trim().to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}
