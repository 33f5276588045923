//! The sandbox global environment: console, timers, `process.env`, and the
//! `Buffer`/`URL` prelude backed by host codecs. Nothing else from the host
//! is reachable.

use crate::config::types::{EngineError, Result};
use crate::sandbox::console::{build_console, LogBuffer};
use crate::sandbox::timers::{caught_message, install_timers, TimerQueue};
use crate::sandbox::{ContextExtensions, ContextValue};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use rquickjs::function::Opt;
use rquickjs::{CatchResultExt, Ctx, Exception, Function, Object, Value};
use std::str::FromStr;

const PRELUDE: &str = include_str!("prelude.js");

/// Accepts missing padding and stray trailing bits, like the usual script runtimes
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Hex,
    Base64,
    Latin1,
    Ascii,
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "hex" => Ok(Encoding::Hex),
            "base64" => Ok(Encoding::Base64),
            "latin1" | "binary" => Ok(Encoding::Latin1),
            "ascii" => Ok(Encoding::Ascii),
            _ => Err(format!("Unknown encoding: {}", s)),
        }
    }
}

/// Bytes to text in `encoding`
pub fn encode_bytes(bytes: &[u8], encoding: Encoding) -> String {
    match encoding {
        Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        Encoding::Hex => hex::encode(bytes),
        Encoding::Base64 => STANDARD.encode(bytes),
        Encoding::Latin1 => bytes.iter().map(|b| *b as char).collect(),
        Encoding::Ascii => bytes.iter().map(|b| (b & 0x7f) as char).collect(),
    }
}

/// Text in `encoding` to bytes. Malformed input decodes as far as it is valid.
pub fn decode_text(text: &str, encoding: Encoding) -> Vec<u8> {
    match encoding {
        Encoding::Utf8 => text.as_bytes().to_vec(),
        Encoding::Hex => {
            let digits = text.as_bytes();
            let mut bytes = Vec::with_capacity(digits.len() / 2);
            for pair in digits.chunks_exact(2) {
                match hex::decode(pair) {
                    Ok(byte) => bytes.extend(byte),
                    Err(_) => break,
                }
            }
            bytes
        }
        Encoding::Base64 => {
            let mut cleaned: String = text
                .chars()
                .filter_map(|c| match c {
                    '-' => Some('+'),
                    '_' => Some('/'),
                    c if c.is_ascii_alphanumeric() || c == '+' || c == '/' => Some(c),
                    _ => None,
                })
                .collect();
            // A lone trailing sextet carries no full byte
            if cleaned.len() % 4 == 1 {
                cleaned.pop();
            }
            LENIENT_BASE64.decode(cleaned).unwrap_or_default()
        }
        Encoding::Latin1 | Encoding::Ascii => text.chars().map(|c| c as u32 as u8).collect(),
    }
}

fn encoding_arg(ctx: &Ctx<'_>, name: &str) -> rquickjs::Result<Encoding> {
    name.parse::<Encoding>()
        .map_err(|msg| Exception::throw_type(ctx, &msg))
}

/// WHATWG URL components, or `TypeError: Invalid URL`
fn parse_url<'js>(ctx: Ctx<'js>, input: String, base: Opt<String>) -> rquickjs::Result<Object<'js>> {
    let parsed = match base.0 {
        Some(base) => url::Url::parse(&base).and_then(|base| base.join(&input)),
        None => url::Url::parse(&input),
    };
    let url = parsed.map_err(|_| Exception::throw_type(&ctx, "Invalid URL"))?;

    let hostname = url.host_str().unwrap_or_default().to_string();
    let port = url.port().map(|p| p.to_string()).unwrap_or_default();
    let host = if port.is_empty() {
        hostname.clone()
    } else {
        format!("{}:{}", hostname, port)
    };

    let parts = Object::new(ctx)?;
    parts.set("href", url.as_str())?;
    parts.set("origin", url.origin().ascii_serialization())?;
    parts.set("protocol", format!("{}:", url.scheme()))?;
    parts.set("username", url.username())?;
    parts.set("password", url.password().unwrap_or_default())?;
    parts.set("host", host)?;
    parts.set("hostname", hostname)?;
    parts.set("port", port)?;
    parts.set("pathname", url.path())?;
    parts.set(
        "search",
        url.query().filter(|q| !q.is_empty()).map(|q| format!("?{}", q)).unwrap_or_default(),
    )?;
    parts.set(
        "hash",
        url.fragment().filter(|f| !f.is_empty()).map(|f| format!("#{}", f)).unwrap_or_default(),
    )?;
    Ok(parts)
}

fn host_codec<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<Object<'js>> {
    let codec = Object::new(ctx.clone())?;

    codec.set(
        "encode",
        Function::new(ctx.clone(), |ctx: Ctx<'js>, bytes: Vec<i32>, encoding: String| {
            let encoding = encoding_arg(&ctx, &encoding)?;
            let bytes: Vec<u8> = bytes.into_iter().map(|b| b as u8).collect();
            Ok::<_, rquickjs::Error>(encode_bytes(&bytes, encoding))
        })?,
    )?;
    codec.set(
        "decode",
        Function::new(ctx.clone(), |ctx: Ctx<'js>, text: String, encoding: String| {
            let encoding = encoding_arg(&ctx, &encoding)?;
            let bytes: Vec<i32> = decode_text(&text, encoding).into_iter().map(i32::from).collect();
            Ok::<_, rquickjs::Error>(bytes)
        })?,
    )?;
    codec.set("parseUrl", Function::new(ctx.clone(), parse_url)?)?;

    Ok(codec)
}

/// Populate a fresh context's globals
pub fn install_globals<'js>(
    ctx: &Ctx<'js>,
    logs: &LogBuffer,
    timers: &TimerQueue<'js>,
    depth: i32,
) -> rquickjs::Result<()> {
    let globals = ctx.globals();

    globals.set("console", build_console(ctx, logs, depth)?)?;
    install_timers(ctx, &globals, timers)?;

    let process = Object::new(ctx.clone())?;
    process.set("env", Object::new(ctx.clone())?)?;
    globals.set("process", process)?;

    let prelude: Function<'js> = ctx.eval(PRELUDE)?;
    let exports: Object<'js> = prelude.call((host_codec(ctx)?,))?;
    globals.set("Buffer", exports.get::<_, Value<'js>>("Buffer")?)?;
    globals.set("URL", exports.get::<_, Value<'js>>("URL")?)?;

    Ok(())
}

/// Caller bindings, set after the built-ins so they can replace them
pub fn install_extensions<'js>(
    ctx: &Ctx<'js>,
    extensions: &ContextExtensions,
    depth: i32,
) -> Result<()> {
    let globals = ctx.globals();
    for (name, binding) in extensions {
        let value = match binding {
            ContextValue::Json(json) => {
                let text = serde_json::to_string(json)?;
                ctx.json_parse(text).catch(ctx)
            }
            ContextValue::Script(expr) => ctx.eval::<Value<'js>, _>(format!("({})", expr)).catch(ctx),
        };

        let installed = value.and_then(|value| globals.set(name.as_str(), value).catch(ctx));
        if let Err(caught) = installed {
            return Err(EngineError::Script(format!(
                "Failed to install context extension '{}': {}",
                name,
                caught_message(ctx, caught, depth)
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_names() {
        assert_eq!("UTF-8".parse::<Encoding>(), Ok(Encoding::Utf8));
        assert_eq!("binary".parse::<Encoding>(), Ok(Encoding::Latin1));
        assert!("utf16".parse::<Encoding>().is_err());
    }

    #[test]
    fn test_hex_stops_at_first_bad_pair() {
        assert_eq!(decode_text("6869zz41", Encoding::Hex), b"hi");
        assert_eq!(decode_text("686", Encoding::Hex), b"h");
        assert_eq!(encode_bytes(b"hi", Encoding::Hex), "6869");
    }

    #[test]
    fn test_base64_is_lenient() {
        assert_eq!(decode_text("aGk=", Encoding::Base64), b"hi");
        assert_eq!(decode_text("aGk", Encoding::Base64), b"hi");
        assert_eq!(decode_text("aG k=\n", Encoding::Base64), b"hi");
        assert_eq!(encode_bytes(b"hi", Encoding::Base64), "aGk=");
    }

    #[test]
    fn test_latin1_round_trips_high_bytes() {
        let bytes = decode_text("\u{e9}", Encoding::Latin1);
        assert_eq!(bytes, [0xe9]);
        assert_eq!(encode_bytes(&bytes, Encoding::Latin1), "\u{e9}");
        assert_eq!(encode_bytes(&[0xe9], Encoding::Ascii), "i");
    }
}
