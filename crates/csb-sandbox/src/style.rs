//! Inline CSS style merging.

/// Split a `prop: value; prop2: value2` string into trimmed pairs.
///
/// Declarations without a `:` are dropped.
#[must_use]
pub fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|declaration| {
            let (property, value) = declaration.split_once(':')?;
            let property = property.trim();
            if property.is_empty() {
                return None;
            }
            Some((property.to_owned(), value.trim().to_owned()))
        })
        .collect()
}

/// Merge `overrides` onto `base`, per property.
///
/// Base order is kept, an overridden property changes in place and new
/// properties are appended. The result has the form `prop:value; prop2:value2;`.
///
/// ```
/// use csb_sandbox::merge_style;
///
/// assert_eq!(
///     merge_style("width:100%; height:500px; border:0;", "height: 1000px"),
///     "width:100%; height:1000px; border:0;"
/// );
/// ```
#[must_use]
pub fn merge_style(base: &str, overrides: &str) -> String {
    let mut declarations = parse_style(base);
    for (property, value) in parse_style(overrides) {
        match declarations.iter_mut().find(|(p, _)| *p == property) {
            Some((_, existing)) => *existing = value,
            None => declarations.push((property, value)),
        }
    }

    declarations
        .iter()
        .map(|(property, value)| format!("{property}:{value};"))
        .collect::<Vec<_>>()
        .join(" ")
}
