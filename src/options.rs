/// Compiler options shared by the analyzer and the generator.
///
/// The CLI driver fills this from its arguments; tests build it directly.
#[derive(Debug, Clone)]
pub struct Options {
    // Dumps
    pub dump_tokens: bool,
    pub dump_cmds: bool,
    pub dump_parse_tree: bool,
    pub dump_analyzer_tree: bool,

    // Analysis & generation
    pub only_analysis: bool,
    pub constant_folding: bool,
    pub remove_unused_vars: bool,

    // Other
    pub silent: bool,
    pub mcdoc_path: String,
    pub dp_prefix: String,
    pub dp_path: String,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            dump_tokens: false,
            dump_cmds: false,
            dump_parse_tree: false,
            dump_analyzer_tree: false,
            only_analysis: false,
            constant_folding: true,
            remove_unused_vars: true,
            silent: false,
            mcdoc_path: "./mcdoc/commands.json".to_string(),
            dp_prefix: "mcjava".to_string(),
            dp_path: String::new(),
        }
    }
}

impl Options {
    /// Function references are `<prefix>:<path><scope>`; a non-empty path
    /// needs its trailing slash.
    pub fn normalize_dp_path(&mut self) {
        if !self.dp_path.is_empty() && !self.dp_path.ends_with('/') {
            self.dp_path.push('/');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dp_path_gains_trailing_slash() {
        let mut opts = Options {
            dp_path: "gen".to_string(),
            ..Options::default()
        };
        opts.normalize_dp_path();
        assert_eq!(opts.dp_path, "gen/");
    }

    #[test]
    fn empty_dp_path_stays_empty() {
        let mut opts = Options::default();
        opts.normalize_dp_path();
        assert_eq!(opts.dp_path, "");
    }
}
