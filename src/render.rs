//! Word document (`.docx`) rendering.
//!
//! A `.docx` file is a zip package of WordprocessingML parts. [`DocxBuilder`]
//! accumulates body paragraphs and embedded pictures and writes the minimal
//! set of parts Word and LibreOffice need to open the file.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::Context;
use quick_xml::escape::escape;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::doc_spec::DocSpec;
use crate::tools::Asset;

/// English Metric Units per inch.
const EMU_PER_INCH: u64 = 914_400;

/// Pictures are scaled to this width, keeping their aspect ratio.
const PICTURE_WIDTH_INCHES: u64 = 6;

/// Assets embedded when the document references none of them.
const FALLBACK_IMAGES: usize = 2;

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/><Default Extension="jpg" ContentType="image/jpeg"/><Default Extension="jpeg" ContentType="image/jpeg"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/></Types>"#;

const PACKAGE_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/></Relationships>"#;

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii="Calibri" w:hAnsi="Calibri" w:eastAsia="Calibri" w:cs="Calibri"/><w:sz w:val="22"/></w:rPr></w:rPrDefault><w:pPrDefault><w:pPr><w:spacing w:after="160" w:line="259" w:lineRule="auto"/></w:pPr></w:pPrDefault></w:docDefaults><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:qFormat/></w:style><w:style w:type="paragraph" w:styleId="Title"><w:name w:val="Title"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:spacing w:after="240"/></w:pPr><w:rPr><w:sz w:val="56"/><w:color w:val="17365D"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:keepNext/><w:spacing w:before="480" w:after="120"/><w:outlineLvl w:val="0"/></w:pPr><w:rPr><w:b/><w:sz w:val="32"/><w:color w:val="365F91"/></w:rPr></w:style></w:styles>"#;

const DOCUMENT_OPEN: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture"><w:body>"#;

// Letter page with 1" margins: 6.5" of text width.
const DOCUMENT_CLOSE: &str = r#"<w:sectPr><w:pgSz w:w="12240" w:h="15840"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="720" w:footer="720" w:gutter="0"/></w:sectPr></w:body></w:document>"#;

const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const STYLES_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";

/// Picture stored under `word/media/`.
struct Media {
    rel_id: String,
    file_name: String,
    bytes: Vec<u8>,
}

/// Incrementally builds a `.docx` package.
pub struct DocxBuilder {
    title: String,
    body: String,
    media: Vec<Media>,
}

impl DocxBuilder {
    pub fn new() -> Self {
        Self {
            title: String::new(),
            body: String::new(),
            media: Vec::new(),
        }
    }

    /// Add a heading. Level 0 is the document title.
    pub fn heading(&mut self, text: &str, level: u8) -> &mut Self {
        let style = if level == 0 {
            if self.title.is_empty() {
                self.title = text.to_string();
            }
            "Title".to_string()
        } else {
            format!("Heading{}", level)
        };
        self.body.push_str(&format!(
            r#"<w:p><w:pPr><w:pStyle w:val="{}"/></w:pPr>{}</w:p>"#,
            style,
            run(text, false)
        ));
        self
    }

    pub fn paragraph(&mut self, text: &str) -> &mut Self {
        self.body.push_str(&format!("<w:p>{}</w:p>", run(text, false)));
        self
    }

    pub fn italic_paragraph(&mut self, text: &str) -> &mut Self {
        self.body.push_str(&format!("<w:p>{}</w:p>", run(text, true)));
        self
    }

    /// Embed the picture at `path` in its own paragraph.
    pub fn picture(&mut self, path: &Path) -> anyhow::Result<()> {
        let (width_px, height_px) = image::image_dimensions(path)
            .with_context(|| format!("reading image dimensions of {}", path.display()))?;
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading image {}", path.display()))?;

        let index = self.media.len() + 1;
        // rId1 is taken by the styles part.
        let rel_id = format!("rId{}", index + 1);
        let extension = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("jpg") | Some("jpeg") => "jpg",
            _ => "png",
        };
        let file_name = format!("image{}.{}", index, extension);

        let cx = PICTURE_WIDTH_INCHES * EMU_PER_INCH;
        let cy = cx * u64::from(height_px.max(1)) / u64::from(width_px.max(1));

        self.body.push_str(&format!(
            concat!(
                r#"<w:p><w:r><w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0">"#,
                r#"<wp:extent cx="{cx}" cy="{cy}"/><wp:docPr id="{id}" name="Picture {id}"/>"#,
                r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks noChangeAspect="1"/>"#,
                r#"</wp:cNvGraphicFramePr><a:graphic>"#,
                r#"<a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
                r#"<pic:pic><pic:nvPicPr><pic:cNvPr id="{id}" name="{name}"/><pic:cNvPicPr/>"#,
                r#"</pic:nvPicPr><pic:blipFill><a:blip r:embed="{rel}"/>"#,
                r#"<a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
                r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
                r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr></pic:pic>"#,
                r#"</a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#
            ),
            cx = cx,
            cy = cy,
            id = index,
            name = file_name,
            rel = rel_id,
        ));

        self.media.push(Media {
            rel_id,
            file_name,
            bytes,
        });
        Ok(())
    }

    pub fn picture_count(&self) -> usize {
        self.media.len()
    }

    /// Write the package to `out_path`, creating parent directories.
    pub fn save(&self, out_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let file = File::create(out_path)
            .with_context(|| format!("creating {}", out_path.display()))?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        // Already-compressed image data gains nothing from deflate.
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        part(&mut zip, "[Content_Types].xml", CONTENT_TYPES_XML.as_bytes(), options)?;
        part(&mut zip, "_rels/.rels", PACKAGE_RELS_XML.as_bytes(), options)?;
        part(&mut zip, "docProps/core.xml", self.core_xml().as_bytes(), options)?;
        part(&mut zip, "word/styles.xml", STYLES_XML.as_bytes(), options)?;
        let rels = self.document_rels_xml();
        part(&mut zip, "word/_rels/document.xml.rels", rels.as_bytes(), options)?;

        let document = format!("{}{}{}", DOCUMENT_OPEN, self.body, DOCUMENT_CLOSE);
        part(&mut zip, "word/document.xml", document.as_bytes(), options)?;

        for media in &self.media {
            let name = format!("word/media/{}", media.file_name);
            part(&mut zip, &name, &media.bytes, stored)?;
        }

        zip.finish()?;
        Ok(())
    }

    fn document_rels_xml(&self) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        xml.push_str(&format!(
            r#"<Relationship Id="rId1" Type="{}" Target="styles.xml"/>"#,
            STYLES_REL_TYPE
        ));
        for media in &self.media {
            xml.push_str(&format!(
                r#"<Relationship Id="{}" Type="{}" Target="media/{}"/>"#,
                media.rel_id, IMAGE_REL_TYPE, media.file_name
            ));
        }
        xml.push_str("</Relationships>");
        xml
    }

    fn core_xml(&self) -> String {
        let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:title>{title}</dc:title><dc:creator>blog-agent</dc:creator><dcterms:created xsi:type="dcterms:W3CDTF">{now}</dcterms:created><dcterms:modified xsi:type="dcterms:W3CDTF">{now}</dcterms:modified></cp:coreProperties>"#,
            title = xml_text(&self.title),
            now = now,
        )
    }
}

impl Default for DocxBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn part(
    zip: &mut ZipWriter<File>,
    name: &str,
    data: &[u8],
    options: SimpleFileOptions,
) -> anyhow::Result<()> {
    zip.start_file(name, options)?;
    zip.write_all(data)?;
    Ok(())
}

/// A text run, preserving surrounding whitespace. Line breaks and tabs
/// become `<w:br/>` and `<w:tab/>`.
fn run(text: &str, italic: bool) -> String {
    let props = if italic { "<w:rPr><w:i/></w:rPr>" } else { "" };
    let text = text.replace("\r\n", "\n");

    let mut content = String::new();
    let mut segment = String::new();
    for c in text.chars() {
        let special = match c {
            '\n' | '\r' => "<w:br/>",
            '\t' => "<w:tab/>",
            _ => {
                segment.push(c);
                continue;
            }
        };
        if !segment.is_empty() {
            push_text(&mut content, &segment);
            segment.clear();
        }
        content.push_str(special);
    }
    if !segment.is_empty() || content.is_empty() {
        push_text(&mut content, &segment);
    }

    format!("<w:r>{}{}</w:r>", props, content)
}

fn push_text(content: &mut String, text: &str) {
    content.push_str(r#"<w:t xml:space="preserve">"#);
    content.push_str(&xml_text(text));
    content.push_str("</w:t>");
}

/// Escape text for XML, dropping control characters XML 1.0 cannot carry.
fn xml_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect();
    escape(cleaned.as_str()).into_owned()
}

/// Summary of a rendered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSummary {
    pub pictures: usize,
}

/// Render `doc` to `out_path`, embedding referenced assets.
///
/// Image references to unknown assets, or to assets whose file is gone, are
/// skipped. If nothing was embedded but assets exist, the first two are
/// appended under an `Images` heading with their source URLs.
pub fn render_docx(
    doc: &DocSpec,
    assets: &[Asset],
    out_path: &Path,
) -> anyhow::Result<RenderSummary> {
    let mut builder = DocxBuilder::new();

    builder.heading(&doc.title, 0);
    if !doc.subtitle.is_empty() {
        builder.paragraph(&doc.subtitle);
    }

    for section in &doc.sections {
        builder.heading(&section.heading, 1);

        for paragraph in &section.paragraphs {
            builder.paragraph(paragraph);
        }

        for image in &section.images {
            let Some(asset) = assets.iter().find(|a| a.asset_id == image.asset_id) else {
                tracing::debug!("Skipping unknown asset {}", image.asset_id);
                continue;
            };
            if !asset.path.exists() {
                tracing::warn!(
                    "Asset {} is missing on disk: {}",
                    asset.asset_id,
                    asset.path.display()
                );
                continue;
            }
            if let Err(e) = builder.picture(&asset.path) {
                tracing::warn!("Could not embed asset {}: {:#}", asset.asset_id, e);
                continue;
            }
            if !image.caption.is_empty() {
                builder.italic_paragraph(&image.caption);
            }
        }
    }

    if builder.picture_count() == 0 && !assets.is_empty() {
        builder.heading("Images", 1);
        for asset in assets.iter().take(FALLBACK_IMAGES) {
            if !asset.path.exists() {
                continue;
            }
            match builder.picture(&asset.path) {
                Ok(()) => {
                    if !asset.source_url.is_empty() {
                        builder.paragraph(&asset.source_url);
                    }
                }
                Err(e) => tracing::warn!("Could not embed asset {}: {:#}", asset.asset_id, e),
            }
        }
    }

    if !doc.references.is_empty() {
        builder.heading("References", 1);
        for reference in &doc.references {
            builder.paragraph(&format!("{} — {}", reference.title, reference.url));
        }
    }

    builder.save(out_path)?;
    tracing::info!("Saved document to {}", out_path.display());

    Ok(RenderSummary {
        pictures: builder.picture_count(),
    })
}

/// Names of the pictures embedded in a `.docx` file.
pub fn list_embedded_media(path: &Path) -> anyhow::Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let archive = ZipArchive::new(file)?;
    let mut media: Vec<String> = archive
        .file_names()
        .filter(|name| name.starts_with("word/media/"))
        .map(str::to_string)
        .collect();
    media.sort();
    Ok(media)
}

/// Read one part of a `.docx` package as text.
pub fn read_part(path: &Path, part: &str) -> anyhow::Result<String> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut archive = ZipArchive::new(file)?;
    let mut entry = archive.by_name(part)?;
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc_spec::{ImageRef, Reference, Section};
    use image::RgbImage;
    use std::path::PathBuf;

    fn asset(dir: &Path, id: &str, width: u32, height: u32) -> Asset {
        let path = dir.join(format!("{id}.png"));
        RgbImage::new(width, height).save(&path).unwrap();
        Asset {
            asset_id: id.to_string(),
            path,
            source_url: format!("https://img.test/{id}.png"),
        }
    }

    fn image_ref(asset_id: &str, caption: &str) -> ImageRef {
        ImageRef {
            asset_id: asset_id.to_string(),
            caption: caption.to_string(),
        }
    }

    fn doc(images: Vec<ImageRef>, references: Vec<Reference>) -> DocSpec {
        DocSpec {
            title: "Rust & <XML>".to_string(),
            subtitle: "A short tour".to_string(),
            sections: vec![Section {
                heading: "Intro".to_string(),
                paragraphs: vec![
                    "First paragraph.".to_string(),
                    "Second\u{0007} one.".to_string(),
                ],
                images,
            }],
            references,
        }
    }

    #[test]
    fn renders_text_images_and_references() {
        let dir = tempfile::tempdir().unwrap();
        let a = asset(dir.path(), "img_a", 200, 100);
        let out = dir.path().join("nested/blog.docx");
        let spec = doc(
            vec![image_ref("img_a", "Pipeline"), image_ref("img_missing", "Ghost")],
            vec![Reference {
                title: "Docs".to_string(),
                url: "https://doc.rust-lang.org".to_string(),
            }],
        );

        let summary = render_docx(&spec, &[a], &out).unwrap();

        assert_eq!(summary.pictures, 1);
        assert_eq!(list_embedded_media(&out).unwrap(), vec!["word/media/image1.png"]);

        let xml = read_part(&out, "word/document.xml").unwrap();
        assert!(xml.contains(r#"<w:pStyle w:val="Title"/>"#));
        assert!(xml.contains("Rust &amp; &lt;XML&gt;"));
        assert!(xml.contains("Second one."));
        assert!(xml.contains("<w:rPr><w:i/></w:rPr><w:t xml:space=\"preserve\">Pipeline</w:t>"));
        assert!(!xml.contains("Ghost"));
        assert!(xml.contains("Docs — https://doc.rust-lang.org"));
        // 6in wide, 2:1 aspect
        assert!(xml.contains(r#"<wp:extent cx="5486400" cy="2743200"/>"#));

        let rels = read_part(&out, "word/_rels/document.xml.rels").unwrap();
        assert!(rels.contains(r#"Id="rId2""#));
        assert!(rels.contains("media/image1.png"));
    }

    #[test]
    fn unreferenced_assets_are_appended_under_images_heading() {
        let dir = tempfile::tempdir().unwrap();
        let assets = vec![
            asset(dir.path(), "img_a", 10, 10),
            asset(dir.path(), "img_b", 10, 10),
            asset(dir.path(), "img_c", 10, 10),
        ];
        let out = dir.path().join("blog.docx");

        let summary = render_docx(&doc(vec![], vec![]), &assets, &out).unwrap();

        assert_eq!(summary.pictures, 2);
        let xml = read_part(&out, "word/document.xml").unwrap();
        assert!(xml.contains(">Images</w:t>"));
        assert!(xml.contains("https://img.test/img_a.png"));
        assert!(xml.contains("https://img.test/img_b.png"));
        assert!(!xml.contains("https://img.test/img_c.png"));
        assert!(!xml.contains(">References</w:t>"));
    }

    #[test]
    fn assets_missing_on_disk_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let gone = Asset {
            asset_id: "img_gone".to_string(),
            path: PathBuf::from("/nonexistent/img_gone.png"),
            source_url: "https://img.test/gone.png".to_string(),
        };
        let out = dir.path().join("blog.docx");
        let spec = doc(
            vec![image_ref("img_gone", "Gone")],
            vec![],
        );

        let summary = render_docx(&spec, &[gone], &out).unwrap();

        assert_eq!(summary.pictures, 0);
        assert!(list_embedded_media(&out).unwrap().is_empty());
        let xml = read_part(&out, "word/document.xml").unwrap();
        assert!(xml.contains(">Images</w:t>"));
        assert!(!xml.contains("Gone"));
    }

    #[test]
    fn package_has_required_parts() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("blog.docx");
        render_docx(&DocSpec::fallback("Topic"), &[], &out).unwrap();

        let content_types = read_part(&out, "[Content_Types].xml").unwrap();
        assert!(content_types.contains("/word/document.xml"));
        assert!(read_part(&out, "_rels/.rels").unwrap().contains("word/document.xml"));
        assert!(read_part(&out, "word/styles.xml").unwrap().contains("Heading1"));
        let core = read_part(&out, "docProps/core.xml").unwrap();
        assert!(core.contains("<dc:title>Topic</dc:title>"));
    }

    #[test]
    fn line_breaks_and_tabs_become_run_elements() {
        assert_eq!(
            run("Step one\nStep two\tTabbed", false),
            concat!(
                r#"<w:r><w:t xml:space="preserve">Step one</w:t><w:br/>"#,
                r#"<w:t xml:space="preserve">Step two</w:t><w:tab/>"#,
                r#"<w:t xml:space="preserve">Tabbed</w:t></w:r>"#
            )
        );
        assert_eq!(
            run("a\r\nb\n", true),
            concat!(
                r#"<w:r><w:rPr><w:i/></w:rPr><w:t xml:space="preserve">a</w:t><w:br/>"#,
                r#"<w:t xml:space="preserve">b</w:t><w:br/></w:r>"#
            )
        );
        assert_eq!(run("", false), r#"<w:r><w:t xml:space="preserve"></w:t></w:r>"#);

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("blog.docx");
        let mut spec = doc(vec![], vec![]);
        spec.sections[0].paragraphs = vec!["Step one\nStep two\tTabbed".to_string()];
        render_docx(&spec, &[], &out).unwrap();

        let xml = read_part(&out, "word/document.xml").unwrap();
        assert!(xml.contains("Step one</w:t><w:br/>"));
        assert!(xml.contains("Step two</w:t><w:tab/>"));
        assert!(!xml.contains("Step one\nStep two"));
    }
}
