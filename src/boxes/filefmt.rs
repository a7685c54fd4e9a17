//! On-disk representation of zettel, shared by directory and bundled boxes.
//!
//! A zettel is stored as `<zid>.<ext>`. Text zettel carry their metadata as an inline header;
//! binary and image zettel get a companion `<zid>.meta` file. A lone `<zid>.meta` is a zettel
//! without content. The extension names the syntax unless the metadata says otherwise;
//! `.zettel` leaves the syntax entirely to the header.
use crate::{
    id::Zid,
    meta::{
        keys::{DEFAULT_SYNTAX, KEY_SYNTAX},
        parse::{parse_meta, parse_zettel_text, split_header, write_stored_meta, write_zettel_text},
        Meta,
    },
    parser,
    zettel::{Content, Zettel},
};

pub const META_EXT: &str = "meta";
pub const ZETTEL_EXT: &str = "zettel";

/// Splits a file name into identifier and lowercase extension. Other files give `None`.
pub fn parse_file_name(name: &str) -> Option<(Zid, String)> {
    let (stem, ext) = name.split_once('.')?;
    if stem.len() != 14 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let zid = Zid::parse(stem).ok()?;
    let ext = ext.to_ascii_lowercase();
    if ext.is_empty() || !ext.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    Some((zid, ext))
}

/// Rebuilds a zettel from the bytes of its content file and of its companion meta file.
pub fn decode(zid: Zid, content: Option<(&str, &[u8])>, meta: Option<&[u8]>) -> Zettel {
    let (mut m, body) = match (meta, content) {
        (Some(meta), content) => {
            let m = parse_meta(zid, &String::from_utf8_lossy(meta));
            let body = content.map(|(_, bytes)| bytes.to_vec()).unwrap_or_default();
            (m, Content::new(body))
        }
        (None, Some((_, bytes))) => match std::str::from_utf8(bytes) {
            Ok(text) if !text.contains('\0') => {
                let (m, body) = parse_zettel_text(zid, text);
                (m, Content::from(body))
            }
            _ => (Meta::new(zid), Content::new(bytes.to_vec())),
        },
        (None, None) => (Meta::new(zid), Content::default()),
    };
    if !m.has(KEY_SYNTAX) {
        match content.map(|(ext, _)| ext) {
            Some(ZETTEL_EXT) | None => m.set(KEY_SYNTAX, DEFAULT_SYNTAX),
            Some(ext) => m.set(KEY_SYNTAX, ext),
        }
    }
    Zettel::new(m, body)
}

/// The files representing `zettel`, as pairs of file name and bytes.
pub fn encode(zettel: &Zettel) -> Vec<(String, Vec<u8>)> {
    let zid = zettel.zid();
    let syntax = zettel.meta.syntax();
    let ext = if !syntax.is_empty() && syntax.bytes().all(|b| b.is_ascii_alphanumeric()) {
        syntax.to_ascii_lowercase()
    } else {
        ZETTEL_EXT.to_string()
    };
    if inline_header(zettel) {
        let text = write_zettel_text(&zettel.meta, &zettel.content.as_text());
        return vec![(format!("{zid}.{ext}"), text.into_bytes())];
    }
    let mut files = vec![(
        format!("{zid}.{META_EXT}"),
        write_stored_meta(&zettel.meta).into_bytes(),
    )];
    if !zettel.content.is_empty() {
        files.push((format!("{zid}.{ext}"), zettel.content.as_bytes().to_vec()));
    }
    files
}

/// Text content keeps its metadata inline, unless a header-less text would be misread.
fn inline_header(zettel: &Zettel) -> bool {
    let info = parser::get(zettel.meta.syntax());
    if zettel.content.is_binary() || info.is_image_format() || !info.is_text_format() {
        return false;
    }
    if !write_stored_meta(&zettel.meta).is_empty() {
        return true;
    }
    let (pairs, _) = split_header(&zettel.content.as_text());
    pairs.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::create_test_zettel;
    use pretty_assertions::assert_eq;

    #[test]
    fn file_names() {
        let zid = Zid::parse("20240102030405").unwrap();
        assert_eq!(parse_file_name("20240102030405.zmk"), Some((zid, "zmk".into())));
        assert_eq!(parse_file_name("20240102030405.PNG"), Some((zid, "png".into())));
        assert_eq!(parse_file_name("2024010203040.zmk"), None);
        assert_eq!(parse_file_name("notes.txt"), None);
        assert_eq!(parse_file_name("20240102030405"), None);
        assert_eq!(parse_file_name("20240102030405.zmk~"), None);
    }

    #[test]
    fn text_zettel_use_inline_header() {
        let zettel = create_test_zettel(20_240_102_030_405, "Hi", "zmk", "Body");
        let files = encode(&zettel);
        assert_eq!(
            files,
            vec![(
                "20240102030405.zmk".to_string(),
                b"title: Hi\nsyntax: zmk\n\nBody".to_vec()
            )]
        );
        let back = decode(zettel.zid(), Some(("zmk", files[0].1.as_slice())), None);
        assert_eq!(back, zettel);
    }

    #[test]
    fn binary_zettel_get_meta_file() {
        let mut zettel = create_test_zettel(20_240_102_030_405, "Pic", "png", "");
        zettel.content = Content::new(vec![0x89, b'P', b'N', b'G', 0, 1]);
        let files = encode(&zettel);
        let names: Vec<&str> = files.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["20240102030405.meta", "20240102030405.png"]);
        let back = decode(
            zettel.zid(),
            Some(("png", files[1].1.as_slice())),
            Some(files[0].1.as_slice()),
        );
        assert_eq!(back, zettel);
    }

    #[test]
    fn extension_supplies_missing_syntax() {
        let zid = Zid::parse("20240102030405").unwrap();
        let z = decode(zid, Some(("md", &b"# Title"[..])), None);
        assert_eq!(z.meta.syntax(), "md");
        assert_eq!(z.content.as_text(), "# Title");
        let z = decode(zid, Some(("zettel", &b"title: X\n\nbody"[..])), None);
        assert_eq!(z.meta.syntax(), "zmk");
        assert_eq!(z.meta.title(), Some("X"));
    }
}
