//! Just enough bencode to identify an uploaded `.torrent` file.
//!
//! The gateway never materializes torrent payloads; all it needs from an
//! upload is the SHA-1 of the raw `info` dictionary (the info hash), the
//! display name, the payload size, and the private flag. Full metainfo
//! handling stays on the backends.

use sha1::{Digest, Sha1};

use crate::DomainError;

/// Metadata extracted from raw `.torrent` bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentMeta {
    pub info_hash: String,
    pub name: String,
    pub size: i64,
    pub is_private: bool,
    pub file_count: usize,
}

struct Scanner<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn err(&self, message: &str) -> DomainError {
        DomainError::BadRequest(format!(
            "Invalid torrent file: {message} at byte {}",
            self.pos
        ))
    }

    fn read_string(&mut self) -> Result<&'a [u8], DomainError> {
        let start = self.pos;
        while self.peek().map(|b| b.is_ascii_digit()).unwrap_or(false) {
            self.pos += 1;
        }
        if self.pos == start || self.peek() != Some(b':') {
            return Err(self.err("malformed string length"));
        }
        let len: usize = std::str::from_utf8(&self.data[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.err("unparsable string length"))?;
        self.pos += 1;
        if self.pos + len > self.data.len() {
            return Err(self.err("string exceeds buffer"));
        }
        let value = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(value)
    }

    fn read_int(&mut self) -> Result<i64, DomainError> {
        self.pos += 1; // 'i'
        let start = self.pos;
        while self
            .peek()
            .map(|b| b.is_ascii_digit() || b == b'-')
            .unwrap_or(false)
        {
            self.pos += 1;
        }
        if self.peek() != Some(b'e') {
            return Err(self.err("unterminated integer"));
        }
        let value = std::str::from_utf8(&self.data[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.err("unparsable integer"))?;
        self.pos += 1;
        Ok(value)
    }

    /// Skip one value of any type, returning its span.
    fn skip_value(&mut self) -> Result<(usize, usize), DomainError> {
        let start = self.pos;
        match self.peek().ok_or_else(|| self.err("unexpected end"))? {
            b'i' => {
                self.read_int()?;
            }
            b'l' | b'd' => {
                let is_dict = self.peek() == Some(b'd');
                self.pos += 1;
                while self.peek() != Some(b'e') {
                    if is_dict {
                        self.read_string()?;
                    }
                    self.skip_value()?;
                }
                self.pos += 1;
            }
            b'0'..=b'9' => {
                self.read_string()?;
            }
            _ => return Err(self.err("unknown value marker")),
        }
        Ok((start, self.pos))
    }
}

/// Parse raw `.torrent` bytes into the metadata the gateway persists.
pub fn parse(data: &[u8]) -> Result<TorrentMeta, DomainError> {
    let mut scanner = Scanner::new(data);
    if scanner.peek() != Some(b'd') {
        return Err(DomainError::BadRequest(
            "Invalid torrent file: not a bencoded dictionary".to_string(),
        ));
    }
    scanner.pos += 1;

    let mut info_span: Option<(usize, usize)> = None;
    while scanner.peek() != Some(b'e') {
        let key = scanner.read_string()?.to_vec();
        let span = scanner.skip_value()?;
        if key == b"info" {
            info_span = Some(span);
        }
    }

    let (info_start, info_end) = info_span.ok_or_else(|| {
        DomainError::BadRequest("Invalid torrent file: missing info dictionary".to_string())
    })?;
    let info_bytes = &data[info_start..info_end];

    let mut hasher = Sha1::new();
    hasher.update(info_bytes);
    let info_hash = hex::encode_upper(hasher.finalize());

    let (name, size, is_private, file_count) = scan_info_dict(info_bytes)?;
    Ok(TorrentMeta {
        info_hash,
        name,
        size,
        is_private,
        file_count,
    })
}

fn scan_info_dict(info: &[u8]) -> Result<(String, i64, bool, usize), DomainError> {
    let mut scanner = Scanner::new(info);
    scanner.pos += 1; // 'd'

    let mut name = String::new();
    let mut length: i64 = 0;
    let mut files_total: i64 = 0;
    let mut file_count = 0usize;
    let mut is_private = false;

    while scanner.peek() != Some(b'e') {
        let key = scanner.read_string()?.to_vec();
        match key.as_slice() {
            b"name" => {
                name = String::from_utf8_lossy(scanner.read_string()?).into_owned();
            }
            b"length" => {
                length = scanner.read_int()?;
            }
            b"private" => {
                is_private = scanner.read_int()? == 1;
            }
            b"files" => {
                scanner.pos += 1; // 'l'
                while scanner.peek() != Some(b'e') {
                    let (entry_len, consumed) = scan_file_entry(&mut scanner)?;
                    files_total += entry_len;
                    if consumed {
                        file_count += 1;
                    }
                }
                scanner.pos += 1;
            }
            _ => {
                scanner.skip_value()?;
            }
        }
    }

    let size = if file_count > 0 { files_total } else { length };
    let file_count = file_count.max(1);
    Ok((name, size, is_private, file_count))
}

fn scan_file_entry(scanner: &mut Scanner<'_>) -> Result<(i64, bool), DomainError> {
    if scanner.peek() != Some(b'd') {
        scanner.skip_value()?;
        return Ok((0, false));
    }
    scanner.pos += 1;
    let mut length = 0i64;
    while scanner.peek() != Some(b'e') {
        let key = scanner.read_string()?.to_vec();
        if key == b"length" {
            length = scanner.read_int()?;
        } else {
            scanner.skip_value()?;
        }
    }
    scanner.pos += 1;
    Ok((length, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_file_torrent() -> Vec<u8> {
        // announce + single-file info dict with private flag
        b"d8:announce18:http://tracker/ann4:infod6:lengthi2048e4:name8:demo.iso7:privatei1e12:piece lengthi16384e6:pieces20:aaaaaaaaaaaaaaaaaaaaee"
            .to_vec()
    }

    fn multi_file_torrent() -> Vec<u8> {
        b"d4:infod5:filesld6:lengthi100e4:pathl5:a.txteed6:lengthi900e4:pathl5:b.txteee4:name6:bundle12:piece lengthi16384e6:pieces20:bbbbbbbbbbbbbbbbbbbbee"
            .to_vec()
    }

    #[test]
    fn parses_single_file_metadata() {
        let meta = parse(&single_file_torrent()).unwrap();
        assert_eq!(meta.name, "demo.iso");
        assert_eq!(meta.size, 2048);
        assert!(meta.is_private);
        assert_eq!(meta.file_count, 1);
        assert_eq!(meta.info_hash.len(), 40);
        assert!(crate::entities::is_canonical_info_hash(&meta.info_hash));
    }

    #[test]
    fn parses_multi_file_sizes() {
        let meta = parse(&multi_file_torrent()).unwrap();
        assert_eq!(meta.name, "bundle");
        assert_eq!(meta.size, 1000);
        assert_eq!(meta.file_count, 2);
        assert!(!meta.is_private);
    }

    #[test]
    fn info_hash_is_stable_across_outer_keys() {
        // The hash covers only the info dict, so outer keys must not affect it.
        let a = parse(&single_file_torrent()).unwrap();
        let with_comment = {
            let mut data = b"d7:comment4:hiya".to_vec();
            data.extend_from_slice(&single_file_torrent()[1..]);
            data
        };
        let b = parse(&with_comment).unwrap();
        assert_eq!(a.info_hash, b.info_hash);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse(b"not a torrent").is_err());
        assert!(parse(b"d4:name4:abcde").is_err());
    }
}
