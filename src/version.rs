// src/version.rs

//! RPM version ordering
//!
//! Versions are `[epoch:]version[-release]` strings. Each part is compared
//! with the rpmvercmp segment rule: digit runs numerically, letter runs
//! lexically, and a digit run always beats a letter run. A `~` sorts before
//! anything, including the end of the string, so `1.0~rc1` is older than `1.0`.

use std::cmp::Ordering;

/// Split an EVR string into epoch, version and release
///
/// The epoch ends at the first `:` and the release starts after the last `-`.
pub fn split_evr(evr: &str) -> (Option<&str>, &str, Option<&str>) {
    let (epoch, rest) = match evr.split_once(':') {
        Some((epoch, rest)) => (Some(epoch), rest),
        None => (None, evr),
    };

    match rest.rsplit_once('-') {
        Some((version, release)) => (epoch, version, Some(release)),
        None => (epoch, rest, None),
    }
}

/// Compare two EVR strings
///
/// Epochs are compared only when both sides have one. When just one side
/// carries an epoch it wins if that epoch is positive, which is the same as
/// treating a missing epoch as zero. Releases are compared only when both
/// sides have one, so `1.0` and `1.0-3` are equal.
pub fn compare_evr(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let (epoch_a, version_a, release_a) = split_evr(a);
    let (epoch_b, version_b, release_b) = split_evr(b);

    match (epoch_a, epoch_b) {
        (Some(ea), Some(eb)) => {
            let ord = rpmvercmp(ea, eb);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        (Some(ea), None) if leading_number(ea) > 0 => return Ordering::Greater,
        (None, Some(eb)) if leading_number(eb) > 0 => return Ordering::Less,
        _ => {}
    }

    let ord = rpmvercmp(version_a, version_b);
    if ord != Ordering::Equal {
        return ord;
    }

    match (release_a, release_b) {
        (Some(ra), Some(rb)) => rpmvercmp(ra, rb),
        _ => Ordering::Equal,
    }
}

/// Segment-wise comparison of a single version or release string
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let mut one = a.as_bytes();
    let mut two = b.as_bytes();

    loop {
        one = skip_separators(one);
        two = skip_separators(two);

        match (one.first(), two.first()) {
            (Some(b'~'), Some(b'~')) => {
                one = &one[1..];
                two = &two[1..];
                continue;
            }
            (Some(b'~'), _) => return Ordering::Less,
            (_, Some(b'~')) => return Ordering::Greater,
            _ => {}
        }

        if one.is_empty() || two.is_empty() {
            break;
        }

        let numeric = one[0].is_ascii_digit();
        let (seg_one, rest_one) = take_run(one, numeric);
        let (seg_two, rest_two) = take_run(two, numeric);

        // segments of different kinds: numbers are newer than letters
        if seg_two.is_empty() {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ord = if numeric {
            let seg_one = strip_zeros(seg_one);
            let seg_two = strip_zeros(seg_two);
            seg_one
                .len()
                .cmp(&seg_two.len())
                .then_with(|| seg_one.cmp(seg_two))
        } else {
            seg_one.cmp(seg_two)
        };

        if ord != Ordering::Equal {
            return ord;
        }

        one = rest_one;
        two = rest_two;
    }

    match (one.is_empty(), two.is_empty()) {
        (true, true) => Ordering::Equal,
        (false, _) => Ordering::Greater,
        (true, false) => Ordering::Less,
    }
}

fn skip_separators(s: &[u8]) -> &[u8] {
    let start = s
        .iter()
        .position(|&c| c.is_ascii_alphanumeric() || c == b'~')
        .unwrap_or(s.len());
    &s[start..]
}

fn take_run(s: &[u8], numeric: bool) -> (&[u8], &[u8]) {
    let end = s
        .iter()
        .position(|c| {
            if numeric {
                !c.is_ascii_digit()
            } else {
                !c.is_ascii_alphabetic()
            }
        })
        .unwrap_or(s.len());
    s.split_at(end)
}

fn strip_zeros(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|&c| c != b'0').unwrap_or(s.len());
    &s[start..]
}

/// Numeric prefix of a string, 0 when there is none
fn leading_number(s: &str) -> u64 {
    let digits: String = s.trim_start().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}
