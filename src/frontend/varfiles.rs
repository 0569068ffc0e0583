//! Variable definition files (`*.tfvars`, `*.tfvars.json`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};

use crate::eval::expr::literal_value;
use crate::fs::Filesystem;
use crate::value::Value;

/// Variable files picked up automatically from `dir`, in precedence order.
pub fn find_var_files(fs: &dyn Filesystem, dir: &Path) -> Result<Vec<PathBuf>> {
    let names = fs.read_dir(dir)?;
    let mut found = Vec::new();
    for fixed in ["terraform.tfvars", "terraform.tfvars.json"] {
        if names.iter().any(|n| n == fixed) {
            found.push(dir.join(fixed));
        }
    }
    for suffix in [".auto.tfvars", ".auto.tfvars.json"] {
        let mut auto: Vec<&String> = names.iter().filter(|n| n.ends_with(suffix)).collect();
        auto.sort();
        found.extend(auto.into_iter().map(|n| dir.join(n)));
    }
    Ok(found)
}

/// Reads the top-level assignments of one variable file.
pub fn load_var_file(fs: &dyn Filesystem, path: &Path) -> Result<BTreeMap<String, Value>> {
    let text = fs.read_to_string(path)?;
    let is_json = path
        .extension()
        .map(|ext| ext == "json")
        .unwrap_or(false);

    if is_json {
        return match serde_json::from_str::<serde_json::Value>(&text)? {
            serde_json::Value::Object(map) => Ok(map
                .into_iter()
                .map(|(k, v)| (k, Value::from(v)))
                .collect()),
            _ => bail!("expected a JSON object at the top level"),
        };
    }

    let body: hcl::Body = hcl::from_str(&text)?;
    if body.blocks().next().is_some() {
        bail!("blocks are not allowed in variable files");
    }
    let mut out = BTreeMap::new();
    for attr in body.attributes() {
        let value = literal_value(attr.expr())
            .map_err(|d| anyhow!("evaluating '{}': {d}", attr.key()))?;
        out.insert(attr.key().to_string(), value);
    }
    Ok(out)
}
