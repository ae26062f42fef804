use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use memmap2::Mmap;
use ndarray::Array2;
use tracing::debug;

use crate::error::{FakeSnError, Result};
use crate::image::{Header, HeaderValue, Image};

pub const FITS_BLOCK_SIZE: usize = 2880;
const CARD_SIZE: usize = 80;
const KEYWORD_SIZE: usize = 8;
const MAX_STRING_VALUE: usize = 68;
/// Characters of a long string carried by one card, `&` marker excluded.
const LONG_STRING_CHUNK: usize = MAX_STRING_VALUE - 1;
const COMMENTARY_TEXT: usize = CARD_SIZE - KEYWORD_SIZE;
const COMMENTARY_KEYS: &[&str] = &["HISTORY", "COMMENT", ""];
const HIERARCH: &str = "HIERARCH";
const CONTINUE: &str = "CONTINUE";

/// Keywords describing the data layout. They are regenerated on write and
/// never exposed in an [`Image`] header.
const STRUCTURAL_KEYS: &[&str] = &[
    "SIMPLE", "XTENSION", "BITPIX", "EXTEND", "PCOUNT", "GCOUNT", "BZERO", "BSCALE", "BLANK",
    "CHECKSUM", "DATASUM",
];

/// Layout of one header-data unit inside a file.
#[derive(Clone, Debug)]
pub struct HduInfo {
    /// All keywords of the unit, structural ones included.
    pub header: Header,
    pub bitpix: i64,
    /// Axis lengths, NAXIS1 first.
    pub naxes: Vec<usize>,
    pub data_offset: usize,
    pub data_len: usize,
}

impl HduInfo {
    pub fn extname(&self) -> Option<&str> {
        self.header.get_str("EXTNAME").map(str::trim)
    }

    /// Primary arrays and IMAGE extensions.
    pub fn is_image(&self) -> bool {
        match self.header.get_str("XTENSION") {
            None => true,
            Some(x) => x.trim() == "IMAGE",
        }
    }

    pub fn is_tile_compressed(&self) -> bool {
        self.header.get_bool("ZIMAGE").unwrap_or(false)
    }

    /// (width, height) when the unit holds a 2-D image; extra axes of
    /// length one are tolerated.
    pub fn image_dims(&self) -> Option<(usize, usize)> {
        if !self.is_image() || self.naxes.len() < 2 || self.data_len == 0 {
            return None;
        }
        if self.naxes[2..].iter().any(|&n| n != 1) {
            return None;
        }
        Some((self.naxes[0], self.naxes[1]))
    }
}

/// Memory-mapped FITS file reader.
pub struct FitsReader {
    mmap: Mmap,
    pub hdus: Vec<HduInfo>,
}

impl FitsReader {
    /// Open a file and index its header-data units.
    pub fn open(path: &Path) -> Result<Self> {
        if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("fz")) {
            return Err(FakeSnError::InvalidFits(format!(
                "{}: tile-compressed images are not supported, decompress with funpack first",
                path.display()
            )));
        }

        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < FITS_BLOCK_SIZE || &mmap[..6] != b"SIMPLE" {
            return Err(FakeSnError::InvalidFits(format!(
                "{}: missing SIMPLE keyword",
                path.display()
            )));
        }

        let mut hdus = Vec::new();
        let mut offset = 0;
        while offset + FITS_BLOCK_SIZE <= mmap.len() {
            let (header, header_len) = parse_header(&mmap[offset..])?;
            let bitpix = header.require_i64("BITPIX")?;
            let naxis = header.get_i64("NAXIS").unwrap_or(0).max(0) as usize;
            let naxes = (1..=naxis)
                .map(|i| {
                    header
                        .require_i64(&format!("NAXIS{i}"))
                        .map(|n| n.max(0) as usize)
                })
                .collect::<Result<Vec<_>>>()?;

            let data_len = if naxis == 0 {
                0
            } else {
                let pcount = header.get_i64("PCOUNT").unwrap_or(0).max(0) as usize;
                let gcount = header.get_i64("GCOUNT").unwrap_or(1).max(1) as usize;
                (bitpix.unsigned_abs() as usize / 8) * gcount * (pcount + naxes.iter().product::<usize>())
            };

            let data_offset = offset + header_len;
            if data_offset + data_len > mmap.len() {
                return Err(FakeSnError::InvalidFits(format!(
                    "file truncated: HDU {} needs {} data bytes at offset {}, file has {}",
                    hdus.len(),
                    data_len,
                    data_offset,
                    mmap.len()
                )));
            }

            debug!(
                hdu = hdus.len(),
                bitpix,
                naxes = ?naxes,
                data_len,
                "indexed HDU"
            );
            hdus.push(HduInfo {
                header,
                bitpix,
                naxes,
                data_offset,
                data_len,
            });
            offset = data_offset + padded(data_len);
        }

        Ok(Self { mmap, hdus })
    }

    /// Index of the science unit: the one named `SCI`, else the first unit
    /// holding a 2-D image.
    pub fn science_hdu(&self) -> Result<usize> {
        if let Some(i) = self
            .hdus
            .iter()
            .position(|h| h.extname().is_some_and(|n| n.eq_ignore_ascii_case("SCI")))
        {
            if self.hdus[i].image_dims().is_some() {
                return Ok(i);
            }
        }
        if let Some(i) = self.hdus.iter().position(|h| h.image_dims().is_some()) {
            return Ok(i);
        }
        if self.hdus.iter().any(HduInfo::is_tile_compressed) {
            return Err(FakeSnError::InvalidFits(
                "tile-compressed images are not supported".into(),
            ));
        }
        Err(FakeSnError::InvalidFits("no 2-D image data found".into()))
    }

    /// Decode one unit's pixels to `f64`, applying BSCALE/BZERO. Integer
    /// samples equal to BLANK become NaN.
    pub fn read_data(&self, index: usize) -> Result<Array2<f64>> {
        let hdu = self.hdus.get(index).ok_or_else(|| {
            FakeSnError::InvalidFits(format!("HDU {index} out of range ({} HDUs)", self.hdus.len()))
        })?;
        let (width, height) = hdu
            .image_dims()
            .ok_or_else(|| FakeSnError::InvalidFits(format!("HDU {index} is not a 2-D image")))?;
        if width == 0 || height == 0 {
            return Err(FakeSnError::InvalidDimensions { width, height });
        }

        let n = width * height;
        let raw = &self.mmap[hdu.data_offset..hdu.data_offset + hdu.data_len];
        let values = decode_samples(raw, hdu.bitpix, n, hdu.header.get_i64("BLANK"))?;

        let bscale = hdu.header.get_f64("BSCALE").unwrap_or(1.0);
        let bzero = hdu.header.get_f64("BZERO").unwrap_or(0.0);
        let mut data = Array2::from_shape_vec((height, width), values)
            .map_err(|e| FakeSnError::InvalidFits(e.to_string()))?;
        if bscale != 1.0 || bzero != 0.0 {
            data.mapv_inplace(|v| v * bscale + bzero);
        }
        Ok(data)
    }

    /// Header of one unit with structural keywords removed.
    pub fn user_header(&self, index: usize) -> Header {
        let mut header = self.hdus[index].header.clone();
        header.retain(|c| !is_structural(&c.key));
        header
    }
}

/// Read the science image of a FITS file.
pub fn read_image(path: &Path) -> Result<Image> {
    let reader = FitsReader::open(path)?;
    let index = reader.science_hdu()?;
    let data = reader.read_data(index)?;
    let mut image = Image::new(data, reader.user_header(index))?;
    image.path = Some(path.to_path_buf());
    debug!(
        path = %path.display(),
        hdu = index,
        width = image.width(),
        height = image.height(),
        fakes = image.fakes.len(),
        "read FITS image"
    );
    Ok(image)
}

/// Read only the science header, provenance keywords included.
pub fn read_header(path: &Path) -> Result<Header> {
    let reader = FitsReader::open(path)?;
    let index = reader.science_hdu()?;
    Ok(reader.user_header(index))
}

/// Write an image as a single-HDU BITPIX -64 file.
pub fn write_image(image: &Image, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    let mut cards = vec![
        format_card("SIMPLE", &HeaderValue::Logical(true), Some("conforms to FITS standard"))?,
        format_card("BITPIX", &HeaderValue::Integer(-64), Some("IEEE double precision"))?,
        format_card("NAXIS", &HeaderValue::Integer(2), None)?,
        format_card("NAXIS1", &HeaderValue::Integer(image.width() as i64), None)?,
        format_card("NAXIS2", &HeaderValue::Integer(image.height() as i64), None)?,
    ];
    for card in image.to_fits_header().iter() {
        if is_structural(&card.key) {
            continue;
        }
        cards.extend(format_record(&card.key, &card.value, card.comment.as_deref())?);
    }
    for entry in image.header.commentary() {
        cards.extend(format_commentary(&entry.key, &entry.text));
    }
    cards.push(format!("{:<80}", "END"));

    let mut header_len = 0;
    for card in &cards {
        w.write_all(card.as_bytes())?;
        header_len += CARD_SIZE;
    }
    w.write_all(&vec![b' '; padded(header_len) - header_len])?;

    for &v in image.data.iter() {
        w.write_f64::<BigEndian>(v)?;
    }
    let data_len = image.data.len() * 8;
    w.write_all(&vec![0u8; padded(data_len) - data_len])?;
    w.flush()?;

    debug!(path = %path.display(), cards = cards.len(), "wrote FITS image");
    Ok(())
}

fn padded(len: usize) -> usize {
    len.div_ceil(FITS_BLOCK_SIZE) * FITS_BLOCK_SIZE
}

fn is_structural(key: &str) -> bool {
    STRUCTURAL_KEYS.contains(&key)
        || (key.starts_with("NAXIS") && key[5..].bytes().all(|b| b.is_ascii_digit()))
}

/// Parse header cards up to END. Returns the header and its padded length.
///
/// Commentary cards are kept as commentary, HIERARCH keywords under their
/// full name, and CONTINUE cards are joined onto the long string they
/// extend.
fn parse_header(buf: &[u8]) -> Result<(Header, usize)> {
    let mut header = Header::new();
    let mut continued: Option<String> = None;
    let mut pos = 0;
    loop {
        if pos + CARD_SIZE > buf.len() {
            return Err(FakeSnError::InvalidFits("header has no END card".into()));
        }
        let card = &buf[pos..pos + CARD_SIZE];
        pos += CARD_SIZE;

        let key = String::from_utf8_lossy(&card[..KEYWORD_SIZE]).trim().to_string();
        if key == "END" {
            break;
        }

        if key == CONTINUE {
            let rest = String::from_utf8_lossy(&card[KEYWORD_SIZE..]);
            match (continued.take(), parse_value_text(&rest)) {
                (Some(target), Some((HeaderValue::Text(more), comment))) => {
                    let mut text = header.get_str(&target).unwrap_or_default().to_string();
                    text.pop();
                    text.push_str(&more);
                    let open = text.ends_with('&');
                    header.set_with_comment(&target, text, comment.as_deref());
                    if open {
                        continued = Some(target);
                    }
                }
                _ => debug!(card = pos / CARD_SIZE, "skipped CONTINUE card with no open string"),
            }
            continue;
        }
        continued = None;

        if COMMENTARY_KEYS.contains(&key.as_str()) {
            let text = String::from_utf8_lossy(&card[KEYWORD_SIZE..]);
            let text = text.trim_end();
            if !key.is_empty() || !text.is_empty() {
                header.add_commentary(&key, text);
            }
            continue;
        }

        let parsed = if key == HIERARCH {
            let rest = String::from_utf8_lossy(&card[KEYWORD_SIZE..]);
            rest.split_once('=').and_then(|(name, value)| {
                parse_value_text(value).map(|(v, c)| (name.trim().to_string(), v, c))
            })
        } else {
            parse_card_value(card).map(|(v, c)| (key, v, c))
        };
        if let Some((name, value, comment)) = parsed {
            if matches!(&value, HeaderValue::Text(t) if t.ends_with('&')) {
                continued = Some(name.clone());
            }
            header.set_with_comment(&name, value, comment.as_deref());
        }
    }
    Ok((header, padded(pos)))
}

/// Value and comment of a `KEY     = value / comment` card. Commentary and
/// undefined-value cards yield `None`.
pub fn parse_card_value(card: &[u8]) -> Option<(HeaderValue, Option<String>)> {
    if card.len() < 10 || &card[8..10] != b"= " {
        return None;
    }
    parse_value_text(&String::from_utf8_lossy(&card[10..]))
}

/// Value and comment from the text following the value indicator.
fn parse_value_text(text: &str) -> Option<(HeaderValue, Option<String>)> {
    let text = text.trim_start();

    if let Some(rest) = text.strip_prefix('\'') {
        let mut value = String::new();
        let mut chars = rest.chars().peekable();
        let mut closed = false;
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    value.push('\'');
                } else {
                    closed = true;
                    break;
                }
            } else {
                value.push(c);
            }
        }
        if !closed {
            return None;
        }
        let remainder: String = chars.collect();
        let comment = remainder
            .split_once('/')
            .map(|(_, c)| c.trim().to_string())
            .filter(|c| !c.is_empty());
        return Some((HeaderValue::Text(value.trim_end().to_string()), comment));
    }

    let (raw, comment) = match text.split_once('/') {
        Some((v, c)) => (v.trim(), Some(c.trim().to_string()).filter(|c| !c.is_empty())),
        None => (text.trim(), None),
    };
    let value = match raw {
        "" => return None,
        "T" => HeaderValue::Logical(true),
        "F" => HeaderValue::Logical(false),
        _ => {
            if let Ok(i) = raw.parse::<i64>() {
                HeaderValue::Integer(i)
            } else if let Ok(f) = raw.replace(['D', 'd'], "E").parse::<f64>() {
                HeaderValue::Float(f)
            } else {
                HeaderValue::Text(raw.to_string())
            }
        }
    };
    Some((value, comment))
}

/// Render one 80-character card.
pub fn format_card(key: &str, value: &HeaderValue, comment: Option<&str>) -> Result<String> {
    if key.len() > KEYWORD_SIZE || !key.is_ascii() {
        return Err(FakeSnError::InvalidFits(format!(
            "keyword '{key}' is longer than {KEYWORD_SIZE} characters"
        )));
    }
    let rendered = match value {
        HeaderValue::Logical(b) => format!("{:>20}", if *b { "T" } else { "F" }),
        HeaderValue::Integer(i) => format!("{i:>20}"),
        HeaderValue::Float(f) if f.is_finite() => format!("{:>20}", format_float(*f)),
        HeaderValue::Float(f) => quote(&f.to_string()),
        HeaderValue::Text(s) => quote(s),
    };

    let mut card = format!("{key:<8}= {rendered}");
    push_comment(&mut card, comment);
    Ok(format!("{card:<80}"))
}

/// Render a keyword record as one or more cards. Keywords longer than
/// eight characters use the HIERARCH convention; strings too long for one
/// card continue on CONTINUE cards.
pub fn format_record(key: &str, value: &HeaderValue, comment: Option<&str>) -> Result<Vec<String>> {
    if key.len() > KEYWORD_SIZE || key.contains(' ') {
        return format_hierarch(key, value, comment).map(|c| vec![c]);
    }
    match value {
        HeaderValue::Text(s) if escape(s).len() > MAX_STRING_VALUE => {
            if !key.is_ascii() {
                return Err(FakeSnError::InvalidFits(format!("keyword '{key}' is not ASCII")));
            }
            Ok(format_long_string(key, s, comment))
        }
        _ => format_card(key, value, comment).map(|c| vec![c]),
    }
}

fn format_hierarch(key: &str, value: &HeaderValue, comment: Option<&str>) -> Result<String> {
    if !key.is_ascii() {
        return Err(FakeSnError::InvalidFits(format!("keyword '{key}' is not ASCII")));
    }
    let rendered = match value {
        HeaderValue::Logical(b) => (if *b { "T" } else { "F" }).to_string(),
        HeaderValue::Integer(i) => i.to_string(),
        HeaderValue::Float(f) if f.is_finite() => format_float(*f),
        HeaderValue::Float(f) => format!("'{f}'"),
        HeaderValue::Text(s) => format!("'{}'", escape(s)),
    };
    let mut card = format!("{HIERARCH} {key} = {rendered}");
    if card.len() > CARD_SIZE {
        return Err(FakeSnError::InvalidFits(format!(
            "HIERARCH keyword '{key}' does not fit one card"
        )));
    }
    push_comment(&mut card, comment);
    Ok(format!("{card:<80}"))
}

/// Split a string over a keyword card and CONTINUE cards, each chunk but
/// the last ending in `&`. The comment goes on the last card.
fn format_long_string(key: &str, s: &str, comment: Option<&str>) -> Vec<String> {
    let mut chunks = vec![String::new()];
    let mut width = 0;
    for c in s.chars().filter(char::is_ascii) {
        let w = if c == '\'' { 2 } else { 1 };
        if width + w > LONG_STRING_CHUNK {
            chunks.push(String::new());
            width = 0;
        }
        if let Some(chunk) = chunks.last_mut() {
            chunk.push(c);
        }
        width += w;
    }

    let last = chunks.len() - 1;
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let marker = if i == last { "" } else { "&" };
            let escaped = chunk.replace('\'', "''");
            let mut card = if i == 0 {
                format!("{key:<8}= '{escaped}{marker}'")
            } else {
                format!("{CONTINUE}  '{escaped}{marker}'")
            };
            if i == last {
                push_comment(&mut card, comment);
            }
            format!("{card:<80}")
        })
        .collect()
}

/// Commentary text wrapped over as many cards as it needs.
fn format_commentary(key: &str, text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().filter(char::is_ascii).collect();
    if chars.is_empty() {
        return vec![format!("{key:<80}")];
    }
    chars
        .chunks(COMMENTARY_TEXT)
        .map(|chunk| {
            let mut card = format!("{key:<8}{}", chunk.iter().collect::<String>());
            card.truncate(CARD_SIZE);
            format!("{card:<80}")
        })
        .collect()
}

fn push_comment(card: &mut String, comment: Option<&str>) {
    if let Some(c) = comment {
        card.push_str(" / ");
        card.extend(c.chars().filter(char::is_ascii));
    }
    card.truncate(CARD_SIZE);
}

fn escape(s: &str) -> String {
    s.chars().filter(char::is_ascii).collect::<String>().replace('\'', "''")
}

fn quote(s: &str) -> String {
    let mut escaped = escape(s);
    escaped.truncate(MAX_STRING_VALUE);
    format!("{:<20}", format!("'{escaped:<8}'"))
}

/// Shortest round-tripping representation with a FITS-style exponent.
fn format_float(v: f64) -> String {
    let s = format!("{v:?}").replace('e', "E");
    match s.find('E') {
        Some(pos) if !s[..pos].contains('.') => format!("{}.0{}", &s[..pos], &s[pos..]),
        _ => s,
    }
}

fn decode_samples(raw: &[u8], bitpix: i64, n: usize, blank: Option<i64>) -> Result<Vec<f64>> {
    let needed = n * (bitpix.unsigned_abs() as usize / 8);
    if raw.len() < needed {
        return Err(FakeSnError::InvalidFits(format!(
            "data unit holds {} bytes, image needs {}",
            raw.len(),
            needed
        )));
    }
    let mut cursor = Cursor::new(&raw[..needed]);
    let blank_to_nan = |v: i64| {
        if Some(v) == blank {
            f64::NAN
        } else {
            v as f64
        }
    };

    let values = match bitpix {
        8 => raw[..n].iter().map(|&b| blank_to_nan(b as i64)).collect(),
        16 => {
            let mut buf = vec![0i16; n];
            cursor.read_i16_into::<BigEndian>(&mut buf)?;
            buf.into_iter().map(|v| blank_to_nan(v as i64)).collect()
        }
        32 => {
            let mut buf = vec![0i32; n];
            cursor.read_i32_into::<BigEndian>(&mut buf)?;
            buf.into_iter().map(|v| blank_to_nan(v as i64)).collect()
        }
        64 => {
            let mut buf = vec![0i64; n];
            cursor.read_i64_into::<BigEndian>(&mut buf)?;
            buf.into_iter().map(blank_to_nan).collect()
        }
        -32 => {
            let mut buf = vec![0f32; n];
            cursor.read_f32_into::<BigEndian>(&mut buf)?;
            buf.into_iter().map(f64::from).collect()
        }
        -64 => {
            let mut buf = vec![0f64; n];
            cursor.read_f64_into::<BigEndian>(&mut buf)?;
            buf
        }
        other => {
            return Err(FakeSnError::InvalidFits(format!("unsupported BITPIX {other}")));
        }
    };
    Ok(values)
}
