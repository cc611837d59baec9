//! lopdf-backed implementation of the PDF object model

use std::collections::{HashMap, HashSet};
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::debug;

use super::page_info::{self, inherited_attribute, owned_dict};
use super::{EditableDocument, ImageHandle, PdfEngine};
use crate::error::{LoadError, PlacementError};
use crate::image::SignatureImage;
use crate::position::PageSize;
use crate::style::TextStyle;

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfEngine;

impl PdfEngine for LopdfEngine {
    fn load(&self, bytes: &[u8]) -> Result<Box<dyn EditableDocument>, LoadError> {
        Ok(Box::new(LopdfDocument::load(bytes)?))
    }
}

pub struct LopdfDocument {
    doc: Document,
    pages: Vec<(ObjectId, PageSize)>,
    images: Vec<ObjectId>,
    fonts: HashMap<&'static str, ObjectId>,
    isolated: HashSet<ObjectId>,
}

impl LopdfDocument {
    pub fn load(bytes: &[u8]) -> Result<Self, LoadError> {
        if bytes.len() < 8 || !bytes.starts_with(b"%PDF-") {
            return Err(LoadError::InvalidHeader);
        }

        let doc = Document::load_mem(bytes).map_err(|e| LoadError::Decode(e.to_string()))?;

        let pages: Vec<(ObjectId, PageSize)> = doc
            .get_pages()
            .into_values()
            .map(|id| (id, page_info::page_size(&doc, id)))
            .collect();
        if pages.is_empty() {
            return Err(LoadError::Decode("PDF has no pages".to_string()));
        }

        Ok(Self {
            doc,
            pages,
            images: Vec::new(),
            fonts: HashMap::new(),
            isolated: HashSet::new(),
        })
    }

    fn page_id(&self, page_index: usize) -> Result<ObjectId, PlacementError> {
        self.pages
            .get(page_index)
            .map(|(id, _)| *id)
            .ok_or(PlacementError::InvalidTargetPage {
                page: page_index as i64 + 1,
                page_count: self.pages.len(),
            })
    }

    fn font_object(&mut self, base_font: &'static str) -> ObjectId {
        if let Some(id) = self.fonts.get(base_font) {
            return *id;
        }
        let id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => base_font,
            "Encoding" => "WinAnsiEncoding",
        });
        self.fonts.insert(base_font, id);
        id
    }

    /// Wrap the page's existing content streams in `q`/`Q` so graphics state
    /// they leave behind (an unbalanced `cm`, a colour) does not reach stamps
    /// appended after them.
    fn isolate_existing_content(&mut self, page_id: ObjectId) -> Result<(), PlacementError> {
        if !self.isolated.insert(page_id) {
            return Ok(());
        }

        let page = self
            .doc
            .get_object(page_id)
            .and_then(|o| o.as_dict())
            .map_err(|e| PlacementError::Draw(e.to_string()))?;
        let mut streams = match page.get(b"Contents") {
            Ok(Object::Reference(id)) => vec![Object::Reference(*id)],
            Ok(Object::Array(items)) if !items.is_empty() => items.clone(),
            _ => return Ok(()),
        };

        let open = self.doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let close = self.doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));
        streams.insert(0, Object::Reference(open));
        streams.push(Object::Reference(close));

        self.doc
            .get_object_mut(page_id)
            .and_then(|o| o.as_dict_mut())
            .map_err(|e| PlacementError::Draw(e.to_string()))?
            .set("Contents", streams);
        Ok(())
    }

    fn append_content(
        &mut self,
        page_id: ObjectId,
        operations: Vec<Operation>,
    ) -> Result<(), PlacementError> {
        self.isolate_existing_content(page_id)?;
        let content = Content { operations }
            .encode()
            .map_err(|e| PlacementError::Draw(e.to_string()))?;
        self.doc
            .add_page_contents(page_id, content)
            .map_err(|e| PlacementError::Draw(e.to_string()))
    }
}

impl EditableDocument for LopdfDocument {
    fn page_sizes(&self) -> Vec<PageSize> {
        self.pages.iter().map(|(_, size)| *size).collect()
    }

    fn embed_image(&mut self, image: &SignatureImage) -> Result<ImageHandle, PlacementError> {
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => image.width as i64,
            "Height" => image.height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        };

        if let Some(alpha) = &image.alpha {
            let smask = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => image.width as i64,
                    "Height" => image.height as i64,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                    "Filter" => "FlateDecode",
                },
                deflate(alpha)?,
            );
            let smask_id = self.doc.add_object(smask);
            dict.set("SMask", smask_id);
        }

        let image_id = self.doc.add_object(Stream::new(dict, deflate(&image.rgb)?));
        self.images.push(image_id);
        debug!(
            "Embedded {}x{} signature image as {:?}",
            image.width, image.height, image_id
        );

        Ok(ImageHandle {
            slot: self.images.len() - 1,
            width: image.width as f64,
            height: image.height as f64,
        })
    }

    fn draw_image(
        &mut self,
        page_index: usize,
        image: &ImageHandle,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> Result<(), PlacementError> {
        let page_id = self.page_id(page_index)?;
        let image_id = *self
            .images
            .get(image.slot)
            .ok_or_else(|| PlacementError::Embed("image is not part of this document".into()))?;

        let name = register_page_resource(&mut self.doc, page_id, b"XObject", "ImSig", image_id)?;

        self.append_content(
            page_id,
            vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        real(width),
                        0.into(),
                        0.into(),
                        real(height),
                        real(x),
                        real(y),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(name.into_bytes())]),
                Operation::new("Q", vec![]),
            ],
        )
    }

    fn draw_text(
        &mut self,
        page_index: usize,
        text: &str,
        x: f64,
        y: f64,
        style: &TextStyle,
    ) -> Result<(), PlacementError> {
        let page_id = self.page_id(page_index)?;
        let base_font = style.pdf_font_name();
        let font_id = self.font_object(base_font);
        let prefix = format!("FSig{}_", base_font.replace('-', ""));
        let name = register_page_resource(&mut self.doc, page_id, b"Font", &prefix, font_id)?;

        let (r, g, b) = style.rgb();
        self.append_content(
            page_id,
            vec![
                Operation::new("q", vec![]),
                Operation::new("BT", vec![]),
                Operation::new(
                    "Tf",
                    vec![Object::Name(name.into_bytes()), real(style.font_size)],
                ),
                Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)]),
                Operation::new("Td", vec![real(x), real(y)]),
                Operation::new(
                    "Tj",
                    vec![Object::String(win_ansi_bytes(text), StringFormat::Literal)],
                ),
                Operation::new("ET", vec![]),
                Operation::new("Q", vec![]),
            ],
        )
    }

    fn save(mut self: Box<Self>) -> Result<Vec<u8>, PlacementError> {
        let mut output = Vec::new();
        self.doc
            .save_to(&mut output)
            .map_err(|e| PlacementError::Encode(e.to_string()))?;
        Ok(output)
    }
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, PlacementError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| PlacementError::Embed(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| PlacementError::Embed(e.to_string()))
}

/// Characters outside Latin-1 have no glyph in the standard fonts.
fn win_ansi_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) < 256 { c as u8 } else { b'?' })
        .collect()
}

/// Bind `target` under a `{prefix}{n}` name in one resource category of a page
/// and return the name.
///
/// A name already bound to `target` is reused; otherwise the first unused `n`
/// is taken, so entries from earlier saves are never rebound. Inherited
/// resources are copied onto the page and shared category dictionaries are
/// copied before being changed, so other pages never see the new entry.
fn register_page_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &[u8],
    prefix: &str,
    target: ObjectId,
) -> Result<String, PlacementError> {
    let missing_page = |_| PlacementError::Draw(format!("page {:?} is not a dictionary", page_id));

    let page = doc
        .get_object(page_id)
        .and_then(|o| o.as_dict())
        .map_err(missing_page)?;
    let resources_ref = match page.get(b"Resources") {
        Ok(Object::Reference(id)) => Some(*id),
        Ok(_) => None,
        Err(_) => {
            let inherited = inherited_attribute(doc, page_id, b"Resources")
                .and_then(|obj| owned_dict(doc, obj))
                .unwrap_or_else(Dictionary::new);
            doc.get_object_mut(page_id)
                .and_then(|o| o.as_dict_mut())
                .map_err(missing_page)?
                .set("Resources", inherited);
            None
        }
    };

    let mut entries = {
        let resources = match resources_ref {
            Some(id) => doc.get_object(id).and_then(|o| o.as_dict()),
            None => doc
                .get_object(page_id)
                .and_then(|o| o.as_dict())
                .and_then(|d| d.get(b"Resources"))
                .and_then(|o| o.as_dict()),
        }
        .map_err(|e| PlacementError::Draw(format!("invalid page resources: {}", e)))?;
        resources
            .get(category)
            .ok()
            .and_then(|obj| owned_dict(doc, obj))
            .unwrap_or_else(Dictionary::new)
    };

    let bound = entries.iter().find_map(|(key, value)| match value {
        Object::Reference(id) if *id == target && key.starts_with(prefix.as_bytes()) => {
            Some(String::from_utf8_lossy(key).into_owned())
        }
        _ => None,
    });
    let name = match bound {
        Some(name) => return Ok(name),
        None => (0u32..)
            .map(|n| format!("{}{}", prefix, n))
            .find(|candidate| !entries.has(candidate.as_bytes()))
            .unwrap_or_else(|| prefix.to_string()),
    };
    entries.set(name.clone(), target);

    let resources = match resources_ref {
        Some(id) => doc.get_object_mut(id).and_then(|o| o.as_dict_mut()),
        None => doc
            .get_object_mut(page_id)
            .and_then(|o| o.as_dict_mut())
            .and_then(|d| d.get_mut(b"Resources"))
            .and_then(|o| o.as_dict_mut()),
    }
    .map_err(|e| PlacementError::Draw(format!("invalid page resources: {}", e)))?;
    resources.set(category.to_vec(), Object::Dictionary(entries));
    Ok(name)
}


#[cfg(test)]
mod tests {
    use super::test_support::{blank_pdf, pdf_with_content};
    use super::*;
    use crate::image::test_support::{png_rgba, signature_png};

    fn page_dict(doc: &Document, index: usize) -> Dictionary {
        let page_id = *doc.get_pages().values().nth(index).unwrap();
        doc.get_object(page_id).unwrap().as_dict().unwrap().clone()
    }

    fn content_ops(doc: &Document, index: usize) -> Vec<Operation> {
        let page_id = *doc.get_pages().values().nth(index).unwrap();
        Content::decode(&doc.get_page_content(page_id).unwrap())
            .unwrap()
            .operations
    }

    fn operands(op: &Operation) -> Vec<f64> {
        op.operands
            .iter()
            .filter_map(|o| match o {
                Object::Integer(i) => Some(*i as f64),
                Object::Real(f) => Some(*f as f64),
                _ => None,
            })
            .collect()
    }

    fn find<'a>(ops: &'a [Operation], operator: &str) -> &'a Operation {
        ops.iter()
            .find(|op| op.operator == operator)
            .unwrap_or_else(|| panic!("no {} operator in {:?}", operator, ops))
    }

    #[test]
    fn test_load_rejects_missing_header() {
        assert_eq!(
            LopdfDocument::load(b"hello world, not a pdf").err(),
            Some(LoadError::InvalidHeader)
        );
    }

    #[test]
    fn test_load_rejects_garbage_after_header() {
        let err = LopdfDocument::load(b"%PDF-1.7 garbage").err().unwrap();
        assert!(matches!(err, LoadError::Decode(_)));
    }

    #[test]
    fn test_page_sizes() {
        let doc = LopdfDocument::load(&blank_pdf(3)).unwrap();
        assert_eq!(doc.page_sizes(), vec![PageSize::letter(); 3]);
        assert_eq!(doc.page_count(), 3);
    }

    #[test]
    fn test_draw_image_registers_xobject_and_content() {
        let mut doc = LopdfDocument::load(&blank_pdf(2)).unwrap();
        let image = SignatureImage::decode(&signature_png()).unwrap();
        let handle = doc.embed_image(&image).unwrap();
        assert_eq!((handle.width, handle.height), (40.0, 20.0));
        doc.draw_image(1, &handle, 100.0, 200.0, 100.0, 50.0).unwrap();

        let bytes = Box::new(doc).save().unwrap();
        let saved = Document::load_mem(&bytes).unwrap();

        let page = page_dict(&saved, 1);
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        assert!(xobjects.get(b"ImSig0").is_ok());

        let ops = content_ops(&saved, 1);
        assert!(matches!(&find(&ops, "Do").operands[0], Object::Name(n) if n == b"ImSig0"));
        assert_eq!(
            operands(find(&ops, "cm")),
            vec![100.0, 0.0, 0.0, 50.0, 100.0, 200.0]
        );

        // The other page is untouched
        assert!(page_dict(&saved, 0).get(b"Resources").is_err());
    }

    #[test]
    fn test_draw_text_registers_font() {
        let mut doc = LopdfDocument::load(&blank_pdf(1)).unwrap();
        doc.draw_text(0, "Ada (Countess)", 72.0, 60.0, &TextStyle::default())
            .unwrap();
        let bytes = Box::new(doc).save().unwrap();
        let saved = Document::load_mem(&bytes).unwrap();

        let page = page_dict(&saved, 0);
        let fonts = page
            .get(b"Resources")
            .and_then(|r| r.as_dict())
            .and_then(|r| r.get(b"Font"))
            .and_then(|f| f.as_dict())
            .unwrap();
        assert!(fonts.get(b"FSigHelvetica_0").is_ok());

        let ops = content_ops(&saved, 0);
        let tf = find(&ops, "Tf");
        assert!(matches!(&tf.operands[0], Object::Name(n) if n == b"FSigHelvetica_0"));
        assert_eq!(operands(tf), vec![12.0]);
        assert_eq!(operands(find(&ops, "Td")), vec![72.0, 60.0]);
        assert!(matches!(
            &find(&ops, "Tj").operands[0],
            Object::String(text, _) if text == b"Ada (Countess)"
        ));
    }

    /// Stamp `png` at the origin of page 0 and return the saved bytes.
    fn stamp(bytes: &[u8], png: &[u8]) -> Vec<u8> {
        let mut doc = LopdfDocument::load(bytes).unwrap();
        let image = SignatureImage::decode(png).unwrap();
        let handle = doc.embed_image(&image).unwrap();
        doc.draw_image(0, &handle, 10.0, 10.0, handle.width, handle.height)
            .unwrap();
        doc.draw_text(0, "Ada", 10.0, 5.0, &TextStyle::default())
            .unwrap();
        Box::new(doc).save().unwrap()
    }

    #[test]
    fn test_later_saves_keep_earlier_stamps() {
        let first = stamp(&blank_pdf(1), &png_rgba(40, 20, &[(1, 1)]));
        let second = stamp(&first, &png_rgba(30, 30, &[(2, 2)]));
        let saved = Document::load_mem(&second).unwrap();

        let page = page_dict(&saved, 0);
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();

        let widths: Vec<i64> = content_ops(&saved, 0)
            .iter()
            .filter(|op| op.operator == "Do")
            .map(|op| {
                let name = op.operands[0].as_name().unwrap();
                let id = xobjects.get(name).unwrap().as_reference().unwrap();
                let stream = saved.get_object(id).unwrap().as_stream().unwrap();
                stream.dict.get(b"Width").unwrap().as_i64().unwrap()
            })
            .collect();
        assert_eq!(widths, vec![40, 30]);

        let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
        assert!(fonts.get(b"FSigHelvetica_0").is_ok());
        assert!(fonts.get(b"FSigHelvetica_1").is_ok());
    }

    #[test]
    fn test_existing_content_state_is_isolated() {
        let bytes = stamp(
            &pdf_with_content(b"1 0 0 -1 0 792 cm"),
            &signature_png(),
        );
        let saved = Document::load_mem(&bytes).unwrap();

        let operators: Vec<String> = content_ops(&saved, 0)
            .into_iter()
            .map(|op| op.operator)
            .collect();
        assert_eq!(
            operators,
            vec![
                "q", "cm", "Q", // source page
                "q", "cm", "Do", "Q", // signature
                "q", "BT", "Tf", "rg", "Td", "Tj", "ET", "Q", // text
            ]
        );
    }

    #[test]
    fn test_draw_on_missing_page_fails() {
        let mut doc = LopdfDocument::load(&blank_pdf(1)).unwrap();
        let err = doc
            .draw_text(4, "x", 0.0, 0.0, &TextStyle::default())
            .unwrap_err();
        assert_eq!(
            err,
            PlacementError::InvalidTargetPage {
                page: 5,
                page_count: 1
            }
        );
    }

    #[test]
    fn test_win_ansi_replaces_wide_chars() {
        assert_eq!(win_ansi_bytes("Zoë ✓"), vec![b'Z', b'o', 0xEB, b' ', b'?']);
    }
}
