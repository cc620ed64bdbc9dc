//! Minimal BIFF8 record writer: enough of the legacy workbook stream for
//! labelled cells, styles, merged regions and one embedded picture per sheet.
//!
//! Records are `type: u16, length: u16, data`. Data longer than
//! [`MAX_RECORD_DATA`] continues in `CONTINUE` records.

use std::collections::HashMap;

use uuid::Uuid;

use crate::autoshop::resources::ImageKind;

pub const MAX_RECORD_DATA: usize = 8224;

pub const BOF: u16 = 0x0809;
pub const EOF: u16 = 0x000A;
pub const CODEPAGE: u16 = 0x0042;
pub const WINDOW1: u16 = 0x003D;
pub const FONT: u16 = 0x0031;
pub const XF: u16 = 0x00E0;
pub const STYLE: u16 = 0x0293;
pub const BOUNDSHEET: u16 = 0x0085;
pub const MSODRAWINGGROUP: u16 = 0x00EB;
pub const MSODRAWING: u16 = 0x00EC;
pub const OBJ: u16 = 0x005D;
pub const CONTINUE: u16 = 0x003C;
pub const SST: u16 = 0x00FC;
pub const EXTSST: u16 = 0x00FF;
pub const COLINFO: u16 = 0x007D;
pub const DIMENSIONS: u16 = 0x0200;
pub const ROW: u16 = 0x0208;
pub const LABELSST: u16 = 0x00FD;
pub const NUMBER: u16 = 0x0203;
pub const WINDOW2: u16 = 0x023E;
pub const MERGEDCELLS: u16 = 0x00E5;

pub const BOF_GLOBALS: u16 = 0x0005;
pub const BOF_WORKSHEET: u16 = 0x0010;
const UTF16_CODEPAGE: u16 = 1200;

/// Index of the first font after the four built-in ones. Index 4 does not
/// exist in BIFF font tables.
pub const FIRST_CUSTOM_FONT: u16 = 5;
const BUILTIN_FONTS: usize = 4;
const STYLE_XFS: u16 = 15;
/// XF every unstyled cell and row refers to.
pub const DEFAULT_CELL_XF: u16 = 15;
pub const FIRST_CUSTOM_XF: u16 = 16;

const STRINGS_PER_BUCKET: usize = 8;

/// Byte buffer with little-endian helpers and record framing.
#[derive(Debug, Default)]
pub struct RecordBuffer {
    bytes: Vec<u8>,
}

impl RecordBuffer {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Writes one record, splitting oversized data into `CONTINUE` records.
    pub fn record(&mut self, kind: u16, data: &[u8]) {
        let mut chunks = data.chunks(MAX_RECORD_DATA);
        self.frame(kind, chunks.next().unwrap_or(&[]));
        for chunk in chunks {
            self.frame(CONTINUE, chunk);
        }
    }

    fn frame(&mut self, kind: u16, data: &[u8]) {
        self.bytes.extend_from_slice(&kind.to_le_bytes());
        self.bytes.extend_from_slice(&(data.len() as u16).to_le_bytes());
        self.bytes.extend_from_slice(data);
    }

    pub fn bof(&mut self, substream: u16) {
        let mut data = Payload::default();
        data.u16(0x0600).u16(substream).u16(0x0DBB).u16(0x07CC);
        data.u32(0x0000_0041).u32(0x0000_0006);
        self.record(BOF, &data.0);
    }

    pub fn eof(&mut self) {
        self.record(EOF, &[]);
    }
}

/// Builder for the data portion of one record.
#[derive(Debug, Default, Clone)]
pub struct Payload(pub Vec<u8>);

impl Payload {
    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.0.push(value);
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.0.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.0.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn f64(&mut self, value: f64) -> &mut Self {
        self.0.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.0.extend_from_slice(value);
        self
    }

    /// ShortXLUnicodeString, always stored as UTF-16.
    pub fn short_string(&mut self, value: &str) -> &mut Self {
        let units: Vec<u16> = value.encode_utf16().take(u8::MAX as usize).collect();
        self.u8(units.len() as u8).u8(0x01);
        for unit in units {
            self.u16(unit);
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HorizontalAlign {
    Left,
    Center,
    Right,
}

impl HorizontalAlign {
    fn code(self) -> u8 {
        match self {
            HorizontalAlign::Left => 1,
            HorizontalAlign::Center => 2,
            HorizontalAlign::Right => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FontSpec {
    pub size_points: u16,
    pub bold: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellStyle {
    pub font: FontSpec,
    pub align: HorizontalAlign,
}

/// Fonts and cell formats of one workbook, deduplicated.
#[derive(Debug)]
pub struct StyleTable {
    font_family: String,
    fonts: Vec<FontSpec>,
    styles: Vec<(u16, HorizontalAlign)>,
    lookup: HashMap<CellStyle, u16>,
}

impl StyleTable {
    pub fn new(font_family: &str) -> Self {
        Self {
            font_family: font_family.to_string(),
            fonts: Vec::new(),
            styles: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    /// XF index for `style`, registering it on first use.
    pub fn xf(&mut self, style: CellStyle) -> u16 {
        if let Some(index) = self.lookup.get(&style) {
            return *index;
        }
        let font = match self.fonts.iter().position(|font| *font == style.font) {
            Some(position) => position,
            None => {
                self.fonts.push(style.font);
                self.fonts.len() - 1
            }
        };
        self.styles.push((FIRST_CUSTOM_FONT + font as u16, style.align));
        let index = FIRST_CUSTOM_XF + (self.styles.len() - 1) as u16;
        self.lookup.insert(style, index);
        index
    }

    pub fn write(&self, out: &mut RecordBuffer) {
        let builtin = FontSpec {
            size_points: 10,
            bold: false,
        };
        for _ in 0..BUILTIN_FONTS {
            out.record(FONT, &font_record(&builtin, "Arial"));
        }
        for font in &self.fonts {
            out.record(FONT, &font_record(font, &self.font_family));
        }

        for index in 0..STYLE_XFS {
            let font = match index {
                1 | 2 => 1,
                3 | 4 => 2,
                _ => 0,
            };
            let used = if index == 0 { 0x00 } else { 0xF4 };
            out.record(XF, &xf_record(font, 0xFFF5, 0x20, used));
        }
        out.record(XF, &xf_record(0, 0x0001, 0x20, 0x00));
        for (font, align) in &self.styles {
            // Vertical centre sits in bits 4-6.
            let alignment = align.code() | (1 << 4);
            out.record(XF, &xf_record(*font, 0x0001, alignment, 0xF8));
        }

        // Built-in "Normal" style bound to XF 0.
        out.record(STYLE, &[0x00, 0x80, 0x00, 0xFF]);
    }
}

fn font_record(font: &FontSpec, family: &str) -> Vec<u8> {
    let mut data = Payload::default();
    data.u16(font.size_points * 20)
        .u16(0)
        .u16(0x7FFF)
        .u16(if font.bold { 700 } else { 400 })
        .u16(0)
        .u8(0)
        .u8(0)
        .u8(0)
        .u8(0)
        .short_string(family);
    data.0
}

fn xf_record(font: u16, flags: u16, alignment: u8, used: u8) -> Vec<u8> {
    let mut data = Payload::default();
    data.u16(font)
        .u16(0)
        .u16(flags)
        .u8(alignment)
        .u8(0)
        .u8(0)
        .u8(used)
        .u32(0)
        .u32(0)
        .u16(0x20C0);
    data.0
}

pub fn codepage(out: &mut RecordBuffer) {
    out.record(CODEPAGE, &UTF16_CODEPAGE.to_le_bytes());
}

pub fn window1(out: &mut RecordBuffer) {
    let mut data = Payload::default();
    data.u16(0)
        .u16(0)
        .u16(0x3A5C)
        .u16(0x2000)
        .u16(0x0038)
        .u16(0)
        .u16(0)
        .u16(1)
        .u16(0x0258);
    out.record(WINDOW1, &data.0);
}

/// Writes a BOUNDSHEET record and returns the buffer position of its stream
/// offset field, which is patched once sheet positions are known.
pub fn boundsheet(out: &mut RecordBuffer, name: &str) -> usize {
    let position = out.len() + 4;
    let mut data = Payload::default();
    data.u32(0).u8(0).u8(0).short_string(name);
    out.record(BOUNDSHEET, &data.0);
    position
}

pub fn patch_u32(out: &mut RecordBuffer, position: usize, value: u32) {
    out.bytes_mut()[position..position + 4].copy_from_slice(&value.to_le_bytes());
}

/// Shared string table.
#[derive(Debug, Default)]
pub struct StringTable {
    strings: Vec<String>,
    lookup: HashMap<String, u32>,
    references: u32,
}

impl StringTable {
    pub fn intern(&mut self, value: &str) -> u32 {
        self.references += 1;
        if let Some(index) = self.lookup.get(value) {
            return *index;
        }
        let index = self.strings.len() as u32;
        self.strings.push(value.to_string());
        self.lookup.insert(value.to_string(), index);
        index
    }

    pub fn unique(&self) -> usize {
        self.strings.len()
    }

    /// Writes SST (with its CONTINUE records) followed by EXTSST.
    ///
    /// A string header never straddles two records; when the characters of a
    /// string do, the continuation starts with a fresh option byte.
    pub fn write(&self, out: &mut RecordBuffer) {
        let mut chunks: Vec<Vec<u8>> = Vec::new();
        let mut current = Payload::default();
        current.u32(self.references).u32(self.strings.len() as u32);
        // (chunk index, offset within chunk data) of every bucket's first string
        let mut buckets = Vec::new();

        for (index, value) in self.strings.iter().enumerate() {
            let units: Vec<u16> = value.encode_utf16().collect();
            if current.0.len() + 3 + 2usize.min(units.len() * 2) > MAX_RECORD_DATA {
                chunks.push(std::mem::take(&mut current.0));
            }
            if index % STRINGS_PER_BUCKET == 0 {
                buckets.push((chunks.len(), current.0.len()));
            }
            current.u16(units.len() as u16).u8(0x01);

            let mut remaining = units.as_slice();
            while !remaining.is_empty() {
                let room = (MAX_RECORD_DATA - current.0.len()) / 2;
                if room == 0 {
                    chunks.push(std::mem::take(&mut current.0));
                    current.u8(0x01);
                    continue;
                }
                let (now, later) = remaining.split_at(room.min(remaining.len()));
                for unit in now {
                    current.u16(*unit);
                }
                remaining = later;
            }
        }
        chunks.push(current.0);

        let mut chunk_starts = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            chunk_starts.push(out.len());
            let kind = if index == 0 { SST } else { CONTINUE };
            out.frame(kind, chunk);
        }

        let mut extsst = Payload::default();
        extsst.u16(STRINGS_PER_BUCKET as u16);
        for (chunk, offset) in buckets {
            let header = 4 + offset;
            extsst.u32((chunk_starts[chunk] + header) as u32).u16(header as u16).u16(0);
        }
        out.record(EXTSST, &extsst.0);
    }
}

/// OfficeArt record header: version and instance share the first word.
fn art_header(out: &mut Payload, version: u16, instance: u16, kind: u16, length: usize) {
    out.u16((instance << 4) | version).u16(kind).u32(length as u32);
}

fn art_container(kind: u16, instance: u16, children: &[u8]) -> Vec<u8> {
    let mut out = Payload::default();
    art_header(&mut out, 0xF, instance, kind, children.len());
    out.bytes(children);
    out.0
}

fn art_atom(version: u16, instance: u16, kind: u16, data: &[u8]) -> Vec<u8> {
    let mut out = Payload::default();
    art_header(&mut out, version, instance, kind, data.len());
    out.bytes(data);
    out.0
}

/// Shape ids of drawing `n` (1-based) start at `n * 1024`.
pub fn shape_id_base(drawing: u32) -> u32 {
    drawing * 1024
}

/// A picture placed on one sheet.
#[derive(Debug, Clone)]
pub struct SheetPicture<'a> {
    pub bytes: &'a [u8],
    pub kind: ImageKind,
    pub first_col: u16,
    pub first_row: u16,
    pub end_col: u16,
    pub end_row: u16,
}

impl SheetPicture<'_> {
    fn uid(&self) -> [u8; 16] {
        *Uuid::new_v5(&Uuid::NAMESPACE_OID, self.bytes).as_bytes()
    }
}

/// MSODRAWINGGROUP: the drawing group with one blip store entry per picture,
/// in sheet order.
pub fn drawing_group(out: &mut RecordBuffer, pictures: &[SheetPicture<'_>]) {
    if pictures.is_empty() {
        return;
    }
    let drawings = pictures.len() as u32;
    let shapes_per_drawing = 3u32;

    let mut dgg = Payload::default();
    dgg.u32(shape_id_base(drawings) + 2)
        .u32(drawings + 1)
        .u32(drawings * shapes_per_drawing)
        .u32(drawings);
    for drawing in 1..=drawings {
        dgg.u32(drawing).u32(shapes_per_drawing);
    }

    let mut store = Vec::new();
    for picture in pictures {
        let uid = picture.uid();
        let (blip_kind, blip_instance, bse_type) = match picture.kind {
            ImageKind::Png => (0xF01E, 0x6E0, 6u8),
            ImageKind::Jpeg => (0xF01D, 0x46A, 5u8),
        };
        let mut blip_data = Payload::default();
        blip_data.bytes(&uid).u8(0xFF).bytes(picture.bytes);
        let blip = art_atom(0, blip_instance, blip_kind, &blip_data.0);

        let mut bse = Payload::default();
        bse.u8(bse_type)
            .u8(bse_type)
            .bytes(&uid)
            .u16(0x00FF)
            .u32(blip.len() as u32)
            .u32(1)
            .u32(0)
            .u8(0)
            .u8(0)
            .u8(0)
            .u8(0)
            .bytes(&blip);
        store.extend(art_atom(2, u16::from(bse_type), 0xF007, &bse.0));
    }

    let mut options = Payload::default();
    options
        .u16(0x00BF)
        .u32(0x0008_0008)
        .u16(0x0181)
        .u32(0x0800_0041)
        .u16(0x01C0)
        .u32(0x0800_0040);

    let mut split_colors = Payload::default();
    split_colors
        .u32(0x0800_000D)
        .u32(0x0800_000C)
        .u32(0x0800_0017)
        .u32(0x1000_00F7);

    let mut children = art_atom(0, 0, 0xF006, &dgg.0);
    children.extend(art_container(0xF001, pictures.len() as u16, &store));
    children.extend(art_atom(3, 3, 0xF00B, &options.0));
    children.extend(art_atom(0, 4, 0xF11E, &split_colors.0));

    out.record(MSODRAWINGGROUP, &art_container(0xF000, 0, &children));
}

/// MSODRAWING plus the OBJ record anchoring picture `blip` (1-based index
/// into the blip store) on sheet drawing `drawing`.
pub fn sheet_drawing(out: &mut RecordBuffer, drawing: u32, blip: u32, picture: &SheetPicture<'_>) {
    let group_id = shape_id_base(drawing);
    let picture_id = group_id + 1;

    let mut fdg = Payload::default();
    fdg.u32(2).u32(picture_id);

    let mut group_shape = art_atom(1, 0, 0xF009, &[0u8; 16]);
    let mut fsp = Payload::default();
    fsp.u32(group_id).u32(0x0000_0005);
    group_shape.extend(art_atom(2, 0, 0xF00A, &fsp.0));

    let mut picture_shape = Vec::new();
    let mut fsp = Payload::default();
    fsp.u32(picture_id).u32(0x0000_0A00);
    picture_shape.extend(art_atom(2, 75, 0xF00A, &fsp.0));
    let mut options = Payload::default();
    options.u16(0x4104).u32(blip);
    picture_shape.extend(art_atom(3, 1, 0xF00B, &options.0));
    let mut anchor = Payload::default();
    anchor
        .u16(0)
        .u16(picture.first_col)
        .u16(0)
        .u16(picture.first_row)
        .u16(0)
        .u16(picture.end_col)
        .u16(0)
        .u16(picture.end_row)
        .u16(0);
    picture_shape.extend(art_atom(0, 0, 0xF010, &anchor.0));
    picture_shape.extend(art_atom(0, 0, 0xF011, &[]));

    let mut shapes = art_container(0xF004, 0, &group_shape);
    shapes.extend(art_container(0xF004, 0, &picture_shape));

    let mut children = art_atom(0, drawing as u16, 0xF008, &fdg.0);
    children.extend(art_container(0xF003, 0, &shapes));
    out.record(MSODRAWING, &art_container(0xF002, 0, &children));

    let mut obj = Payload::default();
    obj.u16(0x0015).u16(0x0012).u16(0x0008).u16(1).u16(0x6011);
    obj.bytes(&[0u8; 12]);
    obj.u16(0x0007).u16(0x0002).u16(0xFFFF);
    obj.u16(0x0008).u16(0x0002).u16(0x0001);
    obj.u16(0x0000).u16(0x0000);
    out.record(OBJ, &obj.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(bytes: &[u8]) -> Vec<(u16, Vec<u8>)> {
        let mut found = Vec::new();
        let mut rest = bytes;
        while rest.len() >= 4 {
            let kind = u16::from_le_bytes([rest[0], rest[1]]);
            let length = u16::from_le_bytes([rest[2], rest[3]]) as usize;
            found.push((kind, rest[4..4 + length].to_vec()));
            rest = &rest[4 + length..];
        }
        found
    }

    #[test]
    fn oversized_records_continue() {
        let mut out = RecordBuffer::default();
        out.record(MSODRAWINGGROUP, &vec![7u8; MAX_RECORD_DATA + 10]);
        let found = records(&out.into_bytes());
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, MSODRAWINGGROUP);
        assert_eq!(found[0].1.len(), MAX_RECORD_DATA);
        assert_eq!(found[1].0, CONTINUE);
        assert_eq!(found[1].1.len(), 10);
    }

    #[test]
    fn string_table_splits_between_characters() {
        let mut table = StringTable::default();
        let long = "ж".repeat(5000);
        assert_eq!(table.intern(&long), 0);
        assert_eq!(table.intern("Запчасти"), 1);
        assert_eq!(table.intern(&long), 0);
        assert_eq!(table.unique(), 2);

        let mut out = RecordBuffer::default();
        table.write(&mut out);
        let found = records(&out.into_bytes());
        assert_eq!(found[0].0, SST);
        assert_eq!(u32::from_le_bytes(found[0].1[0..4].try_into().unwrap()), 3);
        assert!(found[0].1.len() > MAX_RECORD_DATA - 2);
        assert_eq!(found[1].0, CONTINUE);
        // continuation of a split string restarts with the UTF-16 flag
        assert_eq!(found[1].1[0], 0x01);
        assert_eq!(found.last().unwrap().0, EXTSST);
    }

    #[test]
    fn styles_are_deduplicated() {
        let mut styles = StyleTable::new("Arial");
        let body = CellStyle {
            font: FontSpec {
                size_points: 16,
                bold: false,
            },
            align: HorizontalAlign::Center,
        };
        let right = CellStyle {
            align: HorizontalAlign::Right,
            ..body
        };
        assert_eq!(styles.xf(body), FIRST_CUSTOM_XF);
        assert_eq!(styles.xf(right), FIRST_CUSTOM_XF + 1);
        assert_eq!(styles.xf(body), FIRST_CUSTOM_XF);

        let mut out = RecordBuffer::default();
        styles.write(&mut out);
        let found = records(&out.into_bytes());
        let fonts = found.iter().filter(|(kind, _)| *kind == FONT).count();
        let xfs = found.iter().filter(|(kind, _)| *kind == XF).count();
        assert_eq!(fonts, BUILTIN_FONTS + 1);
        assert_eq!(xfs, usize::from(FIRST_CUSTOM_XF) + 2);
    }
}
