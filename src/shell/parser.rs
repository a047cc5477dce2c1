//! Command line parsing: pipeline stages, redirection and quoting.
//!
//! The accepted syntax is
//! `cmd [args] [| cmd [args]]* [< infile] [> outfile]`, with double quotes
//! making whitespace and the sentinel characters literal inside a word.
//! Malformed input never fails the parse: an empty stage after a pipe or a
//! redirection with no word deterministically truncates the pipeline at
//! that point.

const PIPE: char = '|';
const IN_REDIRECT: char = '<';
const OUT_REDIRECT: char = '>';
const QUOTE: char = '"';

/// One command and its arguments within a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: String,
    pub args: Vec<String>,
}

impl Stage {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// The parsed form of one command line. An empty line parses to a pipeline
/// with no stages at all, distinct from a pipeline with one empty stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
    pub input_file: Option<String>,
    pub output_file: Option<String>,
}

pub fn parse(line: &str) -> Pipeline {
    Parser {
        chars: line.chars().collect(),
        pos: 0,
    }
    .parse()
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn parse(mut self) -> Pipeline {
        let mut pipeline = Pipeline::default();
        let Some(stage) = self.stage() else {
            return pipeline;
        };
        pipeline.stages.push(stage);
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(PIPE) => {
                    self.bump();
                    match self.stage() {
                        Some(stage) => pipeline.stages.push(stage),
                        None => break,
                    }
                }
                Some(IN_REDIRECT) => {
                    self.bump();
                    match self.word() {
                        Some(word) => pipeline.input_file = Some(word),
                        None => break,
                    }
                }
                Some(OUT_REDIRECT) => {
                    self.bump();
                    match self.word() {
                        Some(word) => pipeline.output_file = Some(word),
                        None => break,
                    }
                }
                _ => break,
            }
        }
        pipeline
    }

    fn stage(&mut self) -> Option<Stage> {
        let mut words = Vec::new();
        while let Some(word) = self.word() {
            words.push(word);
        }
        let mut words = words.into_iter();
        words.next().map(|name| Stage::new(name, words.collect()))
    }

    /// Next whitespace-delimited word, with quote spans kept intact and the
    /// quote characters themselves stripped. `None` at a sentinel or the end
    /// of the line.
    fn word(&mut self) -> Option<String> {
        self.skip_whitespace();
        let mut word = String::new();
        let mut in_quotes = false;
        let mut saw_quote = false;
        while let Some(ch) = self.peek() {
            match ch {
                QUOTE => {
                    in_quotes = !in_quotes;
                    saw_quote = true;
                    self.bump();
                }
                ch if !in_quotes
                    && (ch.is_whitespace()
                        || ch == PIPE
                        || ch == IN_REDIRECT
                        || ch == OUT_REDIRECT) =>
                {
                    break
                }
                ch => {
                    word.push(ch);
                    self.bump();
                }
            }
        }
        (!word.is_empty() || saw_quote).then_some(word)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(name: &str, args: &[&str]) -> Stage {
        Stage::new(name, args.iter().map(|a| a.to_string()).collect())
    }

    #[test]
    fn empty_line_has_no_stages() {
        assert_eq!(parse(""), Pipeline::default());
        assert_eq!(parse("   \t "), Pipeline::default());
    }

    #[test]
    fn single_command_with_arguments() {
        let parsed = parse("grep foo");
        assert_eq!(parsed.stages, vec![stage("grep", &["foo"])]);
        assert_eq!(parsed.input_file, None);
        assert_eq!(parsed.output_file, None);
    }

    #[test]
    fn pipes_split_stages() {
        let parsed = parse("cat notes.txt | sort | wc");
        assert_eq!(
            parsed.stages,
            vec![stage("cat", &["notes.txt"]), stage("sort", &[]), stage("wc", &[])]
        );
    }

    #[test]
    fn quoting_keeps_whitespace_and_sentinels_literal() {
        let parsed = parse(r#"a "b c" | d > "out file""#);
        assert_eq!(parsed.stages, vec![stage("a", &["b c"]), stage("d", &[])]);
        assert_eq!(parsed.output_file, Some("out file".to_string()));
    }

    #[test]
    fn quoted_pipe_is_not_a_stage_separator() {
        let parsed = parse(r#"echo "a|b""#);
        assert_eq!(parsed.stages, vec![stage("echo", &["a|b"])]);
    }

    #[test]
    fn redirections_are_captured() {
        let parsed = parse("wc < data.txt > count.txt");
        assert_eq!(parsed.stages, vec![stage("wc", &[])]);
        assert_eq!(parsed.input_file, Some("data.txt".to_string()));
        assert_eq!(parsed.output_file, Some("count.txt".to_string()));
    }

    #[test]
    fn redirection_before_pipe_is_accepted() {
        let parsed = parse("wc < data.txt | sort");
        assert_eq!(parsed.stages, vec![stage("wc", &[]), stage("sort", &[])]);
        assert_eq!(parsed.input_file, Some("data.txt".to_string()));
    }

    #[test]
    fn later_redirections_overwrite_earlier_ones() {
        let parsed = parse("a > one > two");
        assert_eq!(parsed.output_file, Some("two".to_string()));
    }

    #[test]
    fn empty_stage_truncates_the_pipeline() {
        let parsed = parse("a | | b");
        assert_eq!(parsed.stages, vec![stage("a", &[])]);
        let parsed = parse("a |");
        assert_eq!(parsed.stages, vec![stage("a", &[])]);
    }

    #[test]
    fn dangling_redirect_truncates() {
        let parsed = parse("a >");
        assert_eq!(parsed.stages, vec![stage("a", &[])]);
        assert_eq!(parsed.output_file, None);
    }

    #[test]
    fn unterminated_quote_runs_to_end_of_line() {
        let parsed = parse(r#"echo "half open"#);
        assert_eq!(parsed.stages, vec![stage("echo", &["half open"])]);
    }

    #[test]
    fn quoted_empty_string_is_a_word() {
        let parsed = parse(r#"echo """#);
        assert_eq!(parsed.stages, vec![stage("echo", &[""])]);
    }
}
