//! Sandbox define parameters.
//!
//! The define endpoint takes the whole file set as one `parameters` value:
//! the JSON `{"files": {path: {"content": ...}}}` compressed with LZ-string
//! (`compressToBase64`) and made URL safe. The same value works in a POST
//! body and in a `GET .../define?parameters=` link that creates the sandbox
//! when it is first opened.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::query::MergedQuery;

const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

#[derive(Serialize)]
struct DefineParameters<'a> {
    files: BTreeMap<&'a str, FileContent<'a>>,
}

#[derive(Serialize)]
struct FileContent<'a> {
    content: &'a str,
}

/// Encode a file set as define `parameters`.
///
/// # Errors
///
/// Returns [`serde_json::Error`] if the file set cannot be serialized.
pub fn define_parameters(files: &BTreeMap<String, String>) -> Result<String, serde_json::Error> {
    let parameters = DefineParameters {
        files: files
            .iter()
            .map(|(path, content)| (path.as_str(), FileContent { content }))
            .collect(),
    };
    let json = serde_json::to_string(&parameters)?;
    Ok(url_safe(&compress_to_base64(&json)))
}

/// Link to the define endpoint that creates the sandbox on first visit.
#[must_use]
pub fn define_url(base_url: &str, parameters: &str, query: &MergedQuery, embed: bool) -> String {
    let mut params = MergedQuery::new();
    if embed {
        params.set("embed", "1");
    }
    params.set("parameters", parameters);
    params.set("query", query.to_query_string());
    format!(
        "{}/api/v1/sandboxes/define?{}",
        base_url.trim_end_matches('/'),
        params.to_query_string()
    )
}

fn url_safe(encoded: &str) -> String {
    encoded
        .replace('+', "-")
        .replace('/', "_")
        .trim_end_matches('=')
        .to_owned()
}

/// LZ-string `compressToBase64`.
///
/// Works on UTF-16 code units, like the JavaScript library the service
/// decodes with. Output is padded with `=` to a multiple of four.
#[must_use]
pub fn compress_to_base64(input: &str) -> String {
    let units: Vec<u16> = input.encode_utf16().collect();
    let mut out = compress(&units, |value| char::from(BASE64_ALPHABET[value]));
    match out.len() % 4 {
        1 => out.push_str("==="),
        2 => out.push_str("=="),
        3 => out.push('='),
        _ => {}
    }
    out
}

/// Bit writer emitting one output character per `bits_per_char` bits.
struct BitWriter<F> {
    out: String,
    value: usize,
    position: usize,
    bits_per_char: usize,
    to_char: F,
}

impl<F: Fn(usize) -> char> BitWriter<F> {
    fn bit(&mut self, bit: usize) {
        self.value = (self.value << 1) | bit;
        if self.position == self.bits_per_char - 1 {
            self.position = 0;
            self.out.push((self.to_char)(self.value));
            self.value = 0;
        } else {
            self.position += 1;
        }
    }

    /// Write the low `count` bits of `value`, least significant first.
    fn bits(&mut self, mut value: usize, count: usize) {
        for _ in 0..count {
            self.bit(value & 1);
            value >>= 1;
        }
    }

    fn finish(mut self) -> String {
        loop {
            self.value <<= 1;
            if self.position == self.bits_per_char - 1 {
                self.out.push((self.to_char)(self.value));
                break;
            }
            self.position += 1;
        }
        self.out
    }
}

struct Dictionary {
    codes: HashMap<Vec<u16>, usize>,
    pending: HashSet<u16>,
    size: usize,
    enlarge_in: usize,
    num_bits: usize,
}

impl Dictionary {
    fn tick(&mut self) {
        self.enlarge_in -= 1;
        if self.enlarge_in == 0 {
            self.enlarge_in = 1 << self.num_bits;
            self.num_bits += 1;
        }
    }

    /// Emit the code for `w`, introducing a literal first if `w` is a new character.
    fn emit<F: Fn(usize) -> char>(&mut self, w: &[u16], writer: &mut BitWriter<F>) {
        let first = w[0];
        if w.len() == 1 && self.pending.remove(&first) {
            if first < 256 {
                writer.bits(0, self.num_bits);
                writer.bits(usize::from(first), 8);
            } else {
                writer.bits(1, self.num_bits);
                writer.bits(usize::from(first), 16);
            }
            self.tick();
        } else {
            let code = self.codes.get(w).copied().unwrap_or_default();
            writer.bits(code, self.num_bits);
        }
        self.tick();
    }
}

fn compress<F: Fn(usize) -> char>(input: &[u16], to_char: F) -> String {
    let mut writer = BitWriter {
        out: String::new(),
        value: 0,
        position: 0,
        bits_per_char: 6,
        to_char,
    };
    let mut dict = Dictionary {
        codes: HashMap::new(),
        pending: HashSet::new(),
        size: 3,
        enlarge_in: 2,
        num_bits: 2,
    };
    let mut w: Vec<u16> = Vec::new();

    for &c in input {
        if !dict.codes.contains_key([c].as_slice()) {
            dict.codes.insert(vec![c], dict.size);
            dict.size += 1;
            dict.pending.insert(c);
        }

        let mut wc = w.clone();
        wc.push(c);
        if dict.codes.contains_key(&wc) {
            w = wc;
        } else {
            dict.emit(&w, &mut writer);
            dict.codes.insert(wc, dict.size);
            dict.size += 1;
            w = vec![c];
        }
    }

    if !w.is_empty() {
        dict.emit(&w, &mut writer);
    }

    // End of stream marker.
    writer.bits(2, dict.num_bits);
    writer.finish()
}
