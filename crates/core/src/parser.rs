//! Results-file line parser.
//!
//! One line per constituency:
//! `constituency_name,votes_1,party_code_1,votes_2,party_code_2,...`
//!
//! Escaped commas in constituency names (`Sheffield\, Hallam`) are
//! supported. Parsing is a pure function: the same line always yields the
//! same [`ParsedLine`] or the same error kind.

use std::collections::BTreeMap;

use crate::ingest::{IngestErrorKind, LineError};
use crate::party;

/// A validated per-constituency vote tally from one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub name: String,
    /// party code -> votes; each code appears at most once.
    pub party_votes: BTreeMap<String, i64>,
}

/// Placeholder used to protect escaped commas while splitting.
const ESCAPED_COMMA: char = '\u{0}';

/// Parse one raw line, tagged with its 1-based line number.
///
/// Validation order (first failure wins):
/// 1. field structure — [`MalformedLine`](IngestErrorKind::MalformedLine)
/// 2. vote tokens — [`InvalidVoteCount`](IngestErrorKind::InvalidVoteCount)
/// 3. repeated party codes — [`DuplicateParty`](IngestErrorKind::DuplicateParty)
/// 4. unknown party codes — [`UnknownParty`](IngestErrorKind::UnknownParty)
pub fn parse_line(raw: &str, line_number: i64) -> Result<ParsedLine, LineError> {
    let raw = raw.trim();

    let working = raw.replace("\\,", &ESCAPED_COMMA.to_string());
    let fields: Vec<String> = working
        .split(',')
        .map(|f| f.replace(ESCAPED_COMMA, ",").trim().to_string())
        .collect();

    if fields.len() < 3 {
        return Err(LineError::new(
            line_number,
            IngestErrorKind::MalformedLine,
            "Too few fields: need at least constituency name and one vote/party pair",
        ));
    }

    let name = fields[0].clone();
    if name.is_empty() {
        return Err(LineError::new(
            line_number,
            IngestErrorKind::MalformedLine,
            "Empty constituency name",
        ));
    }

    let remaining = &fields[1..];
    if remaining.len() % 2 != 0 {
        return Err(LineError::new(
            line_number,
            IngestErrorKind::MalformedLine,
            format!(
                "Odd number of vote/party fields ({}); expected pairs of votes and party codes",
                remaining.len()
            ),
        ));
    }

    // Pass 1: every vote token must be a non-negative integer.
    for (i, pair) in remaining.chunks(2).enumerate() {
        let votes_str = &pair[0];
        let party_code = &pair[1];
        match votes_str.parse::<i64>() {
            Ok(votes) if votes < 0 => {
                return Err(LineError::new(
                    line_number,
                    IngestErrorKind::InvalidVoteCount,
                    format!("Negative vote count {votes} for party '{party_code}'"),
                ));
            }
            Ok(_) => {}
            Err(_) => {
                return Err(LineError::new(
                    line_number,
                    IngestErrorKind::InvalidVoteCount,
                    format!("Invalid vote count '{}' at position {}", votes_str, i * 2 + 2),
                ));
            }
        }
    }

    // Pass 2: no party code may repeat within the line.
    let mut seen: Vec<&str> = Vec::new();
    for pair in remaining.chunks(2) {
        let party_code = pair[1].as_str();
        if seen.contains(&party_code) {
            return Err(LineError::new(
                line_number,
                IngestErrorKind::DuplicateParty,
                format!("Duplicate party code '{party_code}' in same line"),
            ));
        }
        seen.push(party_code);
    }

    // Pass 3: every party code must be in the known set.
    for pair in remaining.chunks(2) {
        let party_code = pair[1].as_str();
        if !party::is_known_code(party_code) {
            return Err(LineError::new(
                line_number,
                IngestErrorKind::UnknownParty,
                format!("Unknown party code '{party_code}'"),
            ));
        }
    }

    let mut party_votes = BTreeMap::new();
    for pair in remaining.chunks(2) {
        // Both validated above; chunks are exact pairs.
        let votes: i64 = pair[0].parse().unwrap();
        party_votes.insert(pair[1].clone(), votes);
    }

    Ok(ParsedLine { name, party_votes })
}
