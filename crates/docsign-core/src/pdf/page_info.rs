//! Page-level information extraction
//!
//! Reads page boxes and inherited attributes from the page tree.

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::position::PageSize;

/// Used when neither the page nor any ancestor declares a MediaBox.
pub const FALLBACK_PAGE_SIZE: PageSize = PageSize {
    width: 612.0,
    height: 792.0,
};

/// Size of a page from its MediaBox, inheriting from parents if necessary.
pub fn page_size(doc: &Document, page_id: ObjectId) -> PageSize {
    inherited_attribute(doc, page_id, b"MediaBox")
        .and_then(|obj| resolve(doc, obj).as_array().ok().cloned())
        .and_then(|array| parse_box_array(&array))
        .map(|[x0, y0, x1, y1]| PageSize::new((x1 - x0).abs(), (y1 - y0).abs()))
        .unwrap_or(FALLBACK_PAGE_SIZE)
}

/// Look up a page attribute, walking up the `Parent` chain.
pub fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = Some(page_id);
    // Guard against cyclic Parent references
    let mut depth = 0;
    while let Some(id) = current {
        if depth > 64 {
            return None;
        }
        depth += 1;
        let dict = doc.get_object(id).and_then(|o| o.as_dict()).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        current = dict.get(b"Parent").and_then(|p| p.as_reference()).ok();
    }
    None
}

/// Follow a single reference, returning direct objects unchanged.
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

/// Resolve an object that should be a dictionary into an owned copy.
pub fn owned_dict(doc: &Document, obj: &Object) -> Option<Dictionary> {
    resolve(doc, obj).as_dict().ok().cloned()
}

fn parse_box_array(array: &[Object]) -> Option<[f64; 4]> {
    if array.len() != 4 {
        return None;
    }
    let mut values = [0.0; 4];
    for (slot, obj) in values.iter_mut().zip(array) {
        *slot = obj_to_f64(obj)?;
    }
    Some(values)
}

fn obj_to_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some((*f).into()),
        _ => None,
    }
}
