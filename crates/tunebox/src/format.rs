//! `$field` templates for listing items and albums.

use tunebox_library::Model;

/// Expand `$field` and `${field}` references; `$$` is a literal dollar sign.
/// Unknown fields expand to nothing.
pub fn render(template: &str, model: &dyn Model) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
        } else if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => {
                    out.push_str(&model.formatted(braced[..end].trim()));
                    rest = &braced[end + 1..];
                }
                None => {
                    out.push('$');
                    rest = after;
                }
            }
        } else {
            let len = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            if len == 0 {
                out.push('$');
            } else {
                out.push_str(&model.formatted(&after[..len]));
            }
            rest = &after[len..];
        }
    }
    out.push_str(rest);
    out
}
