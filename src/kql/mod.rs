// KQL — Keyword Query Language: parse (§4.A), expand (§4.B), transpile
// (§4.B) into the backend-DSL builder tree of `crate::dsl`.

pub mod ast;
pub mod expand;
pub mod parser;
pub mod transpile;

use crate::dsl::Builder;
use crate::errors::Result;

/// Parse, expand, and transpile a KQL string straight through to a
/// backend-DSL builder — the composition most callers want.
pub fn compile(kql: &str) -> Result<Box<dyn Builder>> {
    let query = parser::parse(kql)?;
    let query = expand::expand(query)?;
    transpile::transpile(&query.nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_mediatype_folder_end_to_end() {
        let v = compile("mediatype:folder").unwrap().to_json().unwrap();
        assert_eq!(v["term"]["MimeType"]["value"], "httpd/unix-directory");
    }
}
