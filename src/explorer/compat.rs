//! Normalisation of block payloads across node versions
//!
//! Newer nodes dropped several per-entry fields and added a free-form
//! `extra` attribute (`"Coinbase, Value=1000, Maturity=1440"`). The shim
//! fills the dropped fields with the values older nodes reported and parses
//! `extra` into an `extra_map` object on each entry. Keys other than
//! `Coinbase`, `Value` and `Maturity` are passed through as text, or `true`
//! when they carry no value; that rule is not known to cover every token a
//! node can emit.

use serde_json::{Map, Value};

/// Blocks after which an output matures when the node does not say
pub const DEFAULT_MATURITY_OFFSET: u64 = 240;

/// Fill dropped fields and parse `extra` on every entry of `block`
pub fn stabilize_block(block: &mut Value) {
    let block_height = block.get("height").and_then(Value::as_u64);

    if let Some(inputs) = block.get_mut("inputs").and_then(Value::as_array_mut) {
        for input in inputs.iter_mut().filter_map(Value::as_object_mut) {
            if !input.contains_key("maturity") {
                if let Some(height) = input.get("height").and_then(Value::as_u64) {
                    input.insert("maturity".into(), (height + DEFAULT_MATURITY_OFFSET).into());
                }
            }
            parse_extra(input);
        }
    }

    if let Some(kernels) = block.get_mut("kernels").and_then(Value::as_array_mut) {
        for kernel in kernels.iter_mut().filter_map(Value::as_object_mut) {
            kernel.entry("excess").or_insert_with(|| Value::String(String::new()));
            parse_extra(kernel);
        }
    }

    if let Some(outputs) = block.get_mut("outputs").and_then(Value::as_array_mut) {
        for output in outputs.iter_mut().filter_map(Value::as_object_mut) {
            output.entry("coinbase").or_insert(Value::Bool(false));
            output.entry("incubation").or_insert_with(|| 0.into());
            if !output.contains_key("maturity") {
                if let Some(height) = block_height {
                    output.insert("maturity".into(), (height + DEFAULT_MATURITY_OFFSET).into());
                }
            }
            parse_extra(output);
        }
    }
}

/// Parse the `extra` attribute of one entry into `extra_map`.
///
/// `Coinbase` also sets the entry's own `coinbase` flag when it has one and
/// `Maturity` overwrites the entry's `maturity`.
pub fn parse_extra(entry: &mut Map<String, Value>) {
    let mut map = Map::new();

    let extra = match entry.get("extra") {
        Some(Value::String(extra)) => extra.clone(),
        _ => {
            entry.insert("extra_map".into(), Value::Object(map));
            return;
        }
    };

    for token in extra.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let mut parts = token.split('=');
        let key = parts.next().unwrap_or_default();
        let value = parts.next();

        match key {
            "Coinbase" => {
                if entry.contains_key("coinbase") {
                    entry.insert("coinbase".into(), Value::Bool(true));
                }
                map.insert(key.into(), Value::Bool(true));
            }
            "Value" | "Maturity" => {
                let parsed = match value.and_then(parse_leading_int) {
                    Some(number) => Value::from(number),
                    None => fallback_value(value),
                };
                if key == "Maturity" && parsed.is_i64() {
                    entry.insert("maturity".into(), parsed.clone());
                }
                map.insert(key.into(), parsed);
            }
            _ => {
                map.insert(key.into(), fallback_value(value));
            }
        }
    }

    entry.insert("extra_map".into(), Value::Object(map));
}

fn fallback_value(value: Option<&str>) -> Value {
    match value {
        Some(v) if !v.is_empty() => Value::String(v.to_string()),
        _ => Value::Bool(true),
    }
}

/// Integer prefix of `s`, ignoring leading whitespace
fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let sign_len = usize::from(s.starts_with('-') || s.starts_with('+'));
    let digits = s[sign_len..].bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    s[..sign_len + digits].parse().ok()
}
