use crate::command::Params;
use crate::errors::TaskError;
use crate::utils::value::stringify;
use std::io::{Cursor, Read};

const SIGIL: &str = "$$";

fn is_ident_start(ch: char) -> bool {
    ch == '_' || ch.is_ascii_alphabetic()
}

fn is_ident_char(ch: char) -> bool {
    ch == '_' || ch.is_ascii_alphanumeric()
}

/// Substitutes `$$name` and `$${name}` placeholders.
///
/// The doubled sigil keeps shell syntax (`$HOME`, `${PATH}`) untouched.
/// `$$$$` yields a literal `$$`; a sigil not followed by an identifier is
/// copied as-is. Every referenced name must be bound.
pub fn render_template(text: &str, params: &Params) -> Result<String, TaskError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(index) = rest.find(SIGIL) {
        out.push_str(&rest[..index]);
        let after = &rest[index + SIGIL.len()..];

        if let Some(tail) = after.strip_prefix(SIGIL) {
            out.push_str(SIGIL);
            rest = tail;
            continue;
        }

        if let Some(braced) = after.strip_prefix('{') {
            let end = braced.find('}').ok_or_else(|| {
                TaskError::template("Unterminated placeholder: missing '}'")
                    .with_details(serde_json::json!({ "offset": text.len() - rest.len() + index }))
            })?;
            let name = braced[..end].trim();
            if name.is_empty() || !name.chars().all(is_ident_char) {
                return Err(TaskError::template(format!(
                    "Invalid placeholder name '{}'",
                    name
                )));
            }
            out.push_str(&stringify(params.get(name)?));
            rest = &braced[end + 1..];
            continue;
        }

        match after.chars().next() {
            Some(ch) if is_ident_start(ch) => {
                let len = after
                    .char_indices()
                    .find(|(_, c)| !is_ident_char(*c))
                    .map(|(i, _)| i)
                    .unwrap_or(after.len());
                out.push_str(&stringify(params.get(&after[..len])?));
                rest = &after[len..];
            }
            _ => {
                out.push_str(SIGIL);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// Renders a UTF-8 template read from `source` into an in-memory stream
/// positioned at the start, ready to be uploaded.
pub fn template(source: &mut dyn Read, params: &Params) -> Result<Cursor<Vec<u8>>, TaskError> {
    let mut text = String::new();
    source
        .read_to_string(&mut text)
        .map_err(|err| TaskError::template(format!("Unable to read template: {}", err)))?;
    let rendered = render_template(&text, params)?;
    Ok(Cursor::new(rendered.into_bytes()))
}
