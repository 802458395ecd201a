// SPDX-License-Identifier: Apache-2.0
//! Prompt template rendering (§4.7 step 1): `{{var}}` substitution with
//! unknown variables rendered empty rather than left literal or erroring.

use std::collections::HashMap;

use regex::Regex;

fn placeholder_re() -> Regex {
    Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("static pattern")
}

pub fn render_template(template: &str, vars: &HashMap<String, String>) -> String {
    placeholder_re()
        .replace_all(template, |caps: &regex::Captures| vars.get(&caps[1]).cloned().unwrap_or_default())
        .into_owned()
}
