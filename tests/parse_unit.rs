//! Black-box tests of the parser surface the execution engine consumes.

use brine::parse::{is_complete, parse_line, ContinuationRequest, RedirectionKind, TokenKind};

#[test]
fn pipeline_structure() {
    let commands = parse_line("cat /etc/passwd | grep root | wc -l");
    assert_eq!(commands.len(), 1);
    let subcommands = &commands[0].subcommands;
    assert_eq!(subcommands.len(), 3);
    // Every subcommand but the last carries the pipe to its right.
    assert_eq!(subcommands[0].redirections.len(), 1);
    assert_eq!(subcommands[1].redirections.len(), 1);
    assert!(subcommands[2].redirections.is_empty());
    assert_eq!(is_complete(&commands), ContinuationRequest::Nothing);
}

#[test]
fn command_list_attributes() {
    let commands = parse_line("a && b ; c & d");
    assert_eq!(commands.len(), 4);
    assert!(commands[0].short_circuit_on_failure);
    assert!(!commands[1].short_circuit_on_failure);
    assert!(commands[2].in_background);
    assert!(!commands[3].in_background);
}

#[test]
fn fd_numbers_bind_to_redirections() {
    let commands = parse_line("prog 2> errors >> log < input");
    let redirs = &commands[0].subcommands[0].redirections;
    assert_eq!(redirs.len(), 3);
    assert_eq!(
        (redirs[0].kind, redirs[0].fd),
        (RedirectionKind::FileWrite, 2)
    );
    assert_eq!(
        (redirs[1].kind, redirs[1].fd),
        (RedirectionKind::FileWriteAppend, 1)
    );
    assert_eq!((redirs[2].kind, redirs[2].fd), (RedirectionKind::FileRead, 0));
}

#[test]
fn continuations() {
    assert_eq!(
        is_complete(&parse_line("foo |")),
        ContinuationRequest::Pipe
    );
    assert_eq!(
        is_complete(&parse_line("echo \"unfinished")),
        ContinuationRequest::DoubleQuotedString
    );
    assert_eq!(
        is_complete(&parse_line("echo 'unfinished")),
        ContinuationRequest::SingleQuotedString
    );
    assert_eq!(is_complete(&parse_line("")), ContinuationRequest::Nothing);
}

#[test]
fn joined_continuation_line_parses_cleanly() {
    // The read loop appends the next physical line with a newline.
    let commands = parse_line("echo hello |\ntr e a");
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].subcommands.len(), 2);
    assert_eq!(is_complete(&commands), ContinuationRequest::Nothing);
}

#[test]
fn comment_tokens_are_typed() {
    let commands = parse_line("echo one # two three");
    let args = &commands[0].subcommands[0].args;
    assert_eq!(args.last().unwrap().kind, TokenKind::Comment);
}
