//! Linearization of template literals around the slot sentinel.
//!
//! Static segments are joined with [`SENTINEL`] so the whole literal can be
//! handed to the formatter as one string. After formatting, each sentinel is
//! replaced, left to right, by the matching expression wrapped in `${...}`.

use crate::error::{SqltplError, SqltplResult};
use crate::literal::Slot;

/// Stands in for one expression slot. A quoted identifier, so SQL
/// formatters and parsers treat it as an ordinary value.
pub const SENTINEL: &str = "\"sqltpl_slot\"";

/// Segments joined with the sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct Linearized {
    pub text: String,
    pub slots: usize,
}

/// Join segments without checking for collisions. Used where a wrong guess
/// cannot corrupt output, e.g. for classification.
pub fn join(segments: &[String]) -> String {
    segments.join(SENTINEL)
}

/// Join segments with the sentinel, refusing segments that already contain
/// it, alone or together with a neighbouring sentinel.
pub fn linearize(segments: &[String]) -> SqltplResult<Linearized> {
    if let Some(segment) = segments.iter().position(|s| s.contains(SENTINEL)) {
        return Err(SqltplError::SentinelCollision { segment });
    }

    let text = join(segments);
    let slots = segments.len().saturating_sub(1);

    // Offsets where the joined sentinels were put
    let mut expected = Vec::with_capacity(slots);
    let mut at = 0;
    for segment in segments.iter().take(slots) {
        at += segment.len();
        expected.push(at);
        at += SENTINEL.len();
    }

    let stray = text
        .match_indices(SENTINEL)
        .map(|(idx, _)| idx)
        .find(|idx| !expected.contains(idx));
    if let Some(idx) = stray {
        let segment = expected.iter().filter(|&&e| e < idx).count();
        return Err(SqltplError::SentinelCollision { segment });
    }
    if count_sentinels(&text) != slots {
        return Err(SqltplError::SentinelCollision { segment: 0 });
    }

    Ok(Linearized { text, slots })
}

/// Number of sentinels in `text`.
pub fn count_sentinels(text: &str) -> usize {
    text.matches(SENTINEL).count()
}

/// Put the expressions back in place of the sentinels.
///
/// Fails without substituting anything when the sentinel count does not
/// match the slot count.
pub fn delinearize(text: &str, slots: &[Slot]) -> SqltplResult<String> {
    let found = count_sentinels(text);
    if found != slots.len() {
        return Err(SqltplError::SentinelCountMismatch {
            expected: slots.len(),
            found,
        });
    }

    let mut pieces = text.split(SENTINEL);
    let mut output = String::with_capacity(text.len());
    output.push_str(pieces.next().unwrap_or_default());
    for (slot, piece) in slots.iter().zip(pieces) {
        output.push_str("${");
        output.push_str(slot.render());
        output.push('}');
        output.push_str(piece);
    }
    Ok(output)
}
