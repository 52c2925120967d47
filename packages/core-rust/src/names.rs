//! Display helpers for `std::any::type_name` output.

/// Strips module paths from every path segment of a type name.
///
/// `shop::orders::GetOrder` becomes `GetOrder`, and
/// `courier::Typed<shop::GetOrder, shop::Audit>` becomes `Typed<GetOrder, Audit>`.
#[must_use]
pub fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();
    for ch in full.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == ':' {
            segment.push(ch);
        } else {
            flush_segment(&mut out, &segment);
            segment.clear();
            out.push(ch);
        }
    }
    flush_segment(&mut out, &segment);
    out
}

fn flush_segment(out: &mut String, segment: &str) {
    let tail = segment.rsplit("::").next().unwrap_or(segment);
    out.push_str(tail);
}

/// Returns the module path of the outermost type, or `""` for unqualified names.
#[must_use]
pub fn module_path(full: &str) -> &str {
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(idx) => &full[..idx],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_of_plain_path() {
        assert_eq!(short_type_name("shop::orders::GetOrder"), "GetOrder");
        assert_eq!(short_type_name("GetOrder"), "GetOrder");
    }

    #[test]
    fn short_name_strips_generic_arguments_too() {
        assert_eq!(
            short_type_name("courier::Typed<shop::GetOrder, alloc::vec::Vec<u8>>"),
            "Typed<GetOrder, Vec<u8>>"
        );
        assert_eq!(short_type_name("()"), "()");
        assert_eq!(short_type_name("core::option::Option<&str>"), "Option<&str>");
    }

    #[test]
    fn module_path_ignores_generic_arguments() {
        assert_eq!(module_path("shop::orders::GetOrder"), "shop::orders");
        assert_eq!(module_path("shop::Page<other::Item>"), "shop");
        assert_eq!(module_path("u32"), "");
    }
}
