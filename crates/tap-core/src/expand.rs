//! `{placeholder}` substitution for step commands and arguments.

use std::path::Path;

#[derive(Debug, Default)]
pub(crate) struct Vars {
    pairs: Vec<(&'static str, String)>,
}

impl Vars {
    pub(crate) fn set(mut self, key: &'static str, value: impl AsRef<str>) -> Self {
        self.pairs.push((key, value.as_ref().to_string()));
        self
    }

    pub(crate) fn set_path(self, key: &'static str, value: &Path) -> Self {
        let value = value.to_string_lossy().to_string();
        self.set(key, value)
    }

    /// Replace every known `{key}`; unknown braces are left untouched.
    pub(crate) fn expand(&self, template: &str) -> String {
        let mut out = template.to_string();
        for (key, value) in &self.pairs {
            out = out.replace(&format!("{{{key}}}"), value);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_keys_only() {
        let vars = Vars::default()
            .set("name", "jackpot")
            .set_path("bin", Path::new("/p/bin"));
        assert_eq!(vars.expand("{bin}/{name}"), "/p/bin/jackpot");
        assert_eq!(vars.expand("${HOME}/{other}"), "${HOME}/{other}");
    }
}
