//! Content Bounds - Measuring Scene Layers
//!
//! Each named layer is measured on its own by building a probe document
//! (identity camera, the scene's `<defs>`, then the layer) and asking the
//! SVG tree builder for the fill bounding box. Images are measured as
//! plain rects of the same geometry, so hrefs are never resolved.

use resvg::usvg;

use crate::document::{Element, Node, SceneDocument, SVG_NS, XLINK_NS};
use crate::geometry::{union_bbox, view_box_or_fallback, Rect};

/// Union of the extents of every named layer, or the declared viewBox
/// (falling back to the editor camera) when no layer has any extent.
pub fn compute_content_bbox(scene: &SceneDocument, layer_ids: &[&str]) -> Rect {
    let measured = layer_ids
        .iter()
        .map(|id| layer_extent(scene, id))
        .fold(None, union_bbox);

    match measured {
        Some(bbox) => bbox,
        None => {
            log::debug!("no measurable layer, using declared viewBox");
            view_box_or_fallback(scene.root().attr("viewBox"))
        }
    }
}

/// Extent of a single layer; `None` when missing, empty or degenerate.
pub fn layer_extent(scene: &SceneDocument, id: &str) -> Option<Rect> {
    let layer = scene.layer(id)?;
    let probe = probe_markup(scene, layer);

    let tree = match usvg::Tree::from_str(&probe, &usvg::Options::default()) {
        Ok(tree) => tree,
        Err(e) => {
            log::warn!("layer '{}' could not be measured: {}", id, e);
            return None;
        }
    };
    if !tree.root().has_children() {
        return None;
    }

    let bbox = tree.root().abs_bounding_box();
    let rect = Rect::new(
        bbox.x() as f64,
        bbox.y() as f64,
        bbox.width() as f64,
        bbox.height() as f64,
    );
    if rect.is_degenerate() {
        return None;
    }
    log::debug!("layer '{}' extent {:?}", id, rect);
    Some(rect)
}

fn probe_markup(scene: &SceneDocument, layer: &Element) -> String {
    let mut root = Element::new("svg")
        .with_attr("xmlns", SVG_NS)
        .with_attr("xmlns:xlink", XLINK_NS);
    for (key, value) in scene.root().attributes() {
        if key.starts_with("xmlns:") {
            root.set_attr(key, value);
        }
    }
    root.set_attr("width", "1");
    root.set_attr("height", "1");

    for defs in scene.root().child_elements().filter(|e| e.local_name() == "defs") {
        root.children.push(Node::Element(defs.clone()));
    }

    let mut layer = layer.clone();
    layer.for_each_element_mut(&mut image_as_rect);
    // Only the layer's own transform chain matters, not its display state.
    layer.remove_attr("display");
    layer.remove_attr("visibility");
    root.children.push(Node::Element(layer));

    SceneDocument::from_root(root).to_markup()
}

/// Keeps x/y/width/height/transform; everything that could trigger a
/// load or hide the shape is dropped.
fn image_as_rect(e: &mut Element) {
    if e.local_name() != "image" {
        return;
    }
    e.name = "rect".to_string();
    for attr in ["href", "xlink:href", "preserveAspectRatio", "style", "opacity", "stroke"] {
        e.remove_attr(attr);
    }
    e.set_attr("fill", "#000000");
}
