//! Authoring-tool XML (§6's "Output: authoring-tool XML"): a minimal,
//! schema-stable rendering of the magic/version/size/hash fields this crate
//! actually parses for a given subcontainer, hand-assembled through
//! [`XmlWriter`] rather than pulling in a full XML serialization crate —
//! the source tool's own equivalent (see `nacpGenerateAuthoringToolXml` in
//! the reference implementation) builds its XML the same way, by
//! string-appending fixed-shape tags rather than walking a DOM.
//!
//! Schema fidelity beyond these fields is explicitly out of scope; this is
//! a readout of what this crate verified, not a reproduction of the source
//! tool's full element set.

use crate::formats::cartridge::{CardInfo, GameCardHeader};
use crate::formats::cnmt::ContentMetaKey;
use crate::formats::nca::NcaContentType;
use crate::ids::ContentId;

/// Appends well-formed, indented tags to an in-memory buffer. Each `tag_*`
/// call is a single leaf element; `open`/`close` bracket a nested block.
pub struct XmlWriter {
    buf: String,
    depth: usize,
}

impl XmlWriter {
    pub fn new(root: &str) -> Self {
        let mut buf = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        buf.push('<');
        buf.push_str(root);
        buf.push_str(">\n");
        Self { buf, depth: 1 }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.buf.push_str("  ");
        }
    }

    pub fn open(&mut self, tag: &str) -> &mut Self {
        self.indent();
        self.buf.push('<');
        self.buf.push_str(tag);
        self.buf.push_str(">\n");
        self.depth += 1;
        self
    }

    pub fn close(&mut self, tag: &str) -> &mut Self {
        self.depth -= 1;
        self.indent();
        self.buf.push_str("</");
        self.buf.push_str(tag);
        self.buf.push_str(">\n");
        self
    }

    pub fn tag(&mut self, name: &str, value: &str) -> &mut Self {
        self.indent();
        self.buf.push('<');
        self.buf.push_str(name);
        self.buf.push('>');
        self.buf.push_str(&escape(value));
        self.buf.push_str("</");
        self.buf.push_str(name);
        self.buf.push_str(">\n");
        self
    }

    pub fn tag_hex_u32(&mut self, name: &str, value: u32) -> &mut Self {
        self.tag(name, &format!("{value:08x}"))
    }

    pub fn tag_hex_u64(&mut self, name: &str, value: u64) -> &mut Self {
        self.tag(name, &format!("{value:016x}"))
    }

    pub fn tag_u64(&mut self, name: &str, value: u64) -> &mut Self {
        self.tag(name, &value.to_string())
    }

    /// Finishes the document, closing the root element opened by `new`.
    pub fn finish(mut self, root: &str) -> String {
        self.depth = 1;
        self.close(root);
        self.buf
    }
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// XML for a whole-cartridge dump: the header fields and card-info this
/// crate actually decrypts and parses, nothing from the on-cartridge
/// filesystem itself (that's the `filesystem_authoring_xml` subcontainer).
pub fn gamecard_authoring_xml(header: &GameCardHeader, card_info: &CardInfo) -> String {
    let mut w = XmlWriter::new("CardImage");
    w.tag("PackageId", &header.package_id.to_string());
    w.tag("HeaderVersion", &header.header_version.to_string());
    w.tag("RomSize", &format!("{:?}", header.rom_size));
    w.tag("SecureAreaHash", &header.secure_area_hash.to_string());
    w.tag(
        "PartitionFsHeaderHash",
        &header.partition_fs_header_hash.to_string(),
    );
    w.tag_u64("FirmwareVersion", card_info.firmware_version);
    w.finish("CardImage")
}

/// XML for an assembled package (§4.12): the content-meta record's own
/// identity and the content id of the metadata content it was built from.
pub fn package_authoring_xml(key: &ContentMetaKey, meta_content_id: ContentId) -> String {
    let mut w = XmlWriter::new("ContentMeta");
    w.tag_hex_u64("Id", key.id.value());
    w.tag_u64("Version", u32::from(key.version) as u64);
    w.tag("Type", &format!("{:?}", key.ty));
    w.tag("MetaContentId", &meta_content_id.to_string());
    w.finish("ContentMeta")
}

/// XML for a single raw content container (one `.nca`): its content id and
/// the content type byte from its header.
pub fn content_authoring_xml(content_id: ContentId, content_type: NcaContentType, size: u64) -> String {
    let mut w = XmlWriter::new("Content");
    w.tag("Id", &content_id.to_string());
    w.tag("Type", &format!("{:?}", content_type));
    w.tag_u64("Size", size);
    w.finish("Content")
}

/// XML for a filesystem extraction (ROMFS/PFS0/HFS0 unpacked to host
/// files): just the entry count and total uncompressed size, since the
/// extracted files on disk are themselves the fidelity-bearing artifact.
pub fn filesystem_authoring_xml(root_name: &str, file_count: usize, total_size: u64) -> String {
    let mut w = XmlWriter::new("Filesystem");
    w.tag("Root", root_name);
    w.tag_u64("FileCount", file_count as u64);
    w.tag_u64("TotalSize", total_size);
    w.finish("Filesystem")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_produces_well_formed_nesting() {
        let mut w = XmlWriter::new("Root");
        w.open("Child");
        w.tag("Leaf", "value");
        w.close("Child");
        let doc = w.finish("Root");
        assert!(doc.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<Root>\n"));
        assert!(doc.contains("  <Child>\n"));
        assert!(doc.contains("    <Leaf>value</Leaf>\n"));
        assert!(doc.contains("  </Child>\n"));
        assert!(doc.ends_with("</Root>\n"));
    }

    #[test]
    fn tag_value_is_escaped() {
        let mut w = XmlWriter::new("Root");
        w.tag("Name", "Tom & Jerry <Deluxe>");
        let doc = w.finish("Root");
        assert!(doc.contains("Tom &amp; Jerry &lt;Deluxe&gt;"));
    }

    #[test]
    fn filesystem_xml_reports_count_and_size() {
        let doc = filesystem_authoring_xml("romfs", 12, 0x4000);
        assert!(doc.contains("<FileCount>12</FileCount>"));
        assert!(doc.contains("<TotalSize>16384</TotalSize>"));
    }
}
