//! Auto-detecting decompression for GenICam XML payloads.
//!
//! `FirstURL` register contents may point at a plain XML document, a
//! gzip-compressed one, or a zip archive containing exactly one XML file.
//! Detection is by magic bytes, matching the convention used throughout the
//! GenICam ecosystem rather than trusting any file extension in the URL.

use std::io::Read;

use crate::XmlError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZIP_MAGIC: [u8; 4] = [b'P', b'K', 0x03, 0x04];

/// Decompress `bytes` into a UTF-8 XML string, auto-detecting gzip and zip
/// containers by their leading magic bytes. Plain UTF-8 XML passes through
/// unchanged.
pub fn decompress_xml(bytes: &[u8]) -> Result<String, XmlError> {
    if bytes.starts_with(&GZIP_MAGIC) {
        decode_gzip(bytes)
    } else if bytes.starts_with(&ZIP_MAGIC) {
        decode_zip(bytes)
    } else {
        String::from_utf8(bytes.to_vec()).map_err(|err| XmlError::Xml(format!("invalid UTF-8: {err}")))
    }
}

fn decode_gzip(bytes: &[u8]) -> Result<String, XmlError> {
    let mut decoder = flate2::read::GzDecoder::new(bytes);
    let mut out = String::new();
    decoder
        .read_to_string(&mut out)
        .map_err(|err| XmlError::Xml(format!("gzip: {err}")))?;
    Ok(out)
}

fn decode_zip(bytes: &[u8]) -> Result<String, XmlError> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive =
        zip::ZipArchive::new(cursor).map_err(|err| XmlError::Xml(format!("zip: {err}")))?;
    if archive.len() != 1 {
        return Err(XmlError::Invalid(format!(
            "expected exactly one file in zip archive, found {}",
            archive.len()
        )));
    }
    let mut file = archive
        .by_index(0)
        .map_err(|err| XmlError::Xml(format!("zip: {err}")))?;
    let mut out = String::new();
    file.read_to_string(&mut out)
        .map_err(|err| XmlError::Xml(format!("zip: {err}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn plain_utf8_passes_through() {
        let xml = "<Root/>";
        assert_eq!(decompress_xml(xml.as_bytes()).expect("decode"), xml);
    }

    #[test]
    fn gzip_payload_is_inflated() {
        let xml = "<Root><Node/></Root>";
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(xml.as_bytes()).expect("write");
        let compressed = encoder.finish().expect("finish");
        assert_eq!(decompress_xml(&compressed).expect("decode"), xml);
    }

    #[test]
    fn zip_payload_with_single_entry_is_extracted() {
        let xml = "<Root><Node/></Root>";
        let mut buf = Vec::new();
        {
            let cursor = std::io::Cursor::new(&mut buf);
            let mut writer = zip::ZipWriter::new(cursor);
            let options = zip::write::FileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);
            writer.start_file("device.xml", options).expect("start file");
            writer.write_all(xml.as_bytes()).expect("write");
            writer.finish().expect("finish");
        }
        assert_eq!(decompress_xml(&buf).expect("decode"), xml);
    }

    #[test]
    fn zip_payload_with_multiple_entries_is_rejected() {
        let mut buf = Vec::new();
        {
            let cursor = std::io::Cursor::new(&mut buf);
            let mut writer = zip::ZipWriter::new(cursor);
            let options = zip::write::FileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);
            writer.start_file("a.xml", options).expect("start file");
            writer.write_all(b"<A/>").expect("write");
            writer.start_file("b.xml", options).expect("start file");
            writer.write_all(b"<B/>").expect("write");
            writer.finish().expect("finish");
        }
        assert!(decompress_xml(&buf).is_err());
    }
}
