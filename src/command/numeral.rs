//! Numeral normalisation for spoken quantities
//!
//! Accepts Arabic digits (`3`, `2.5`), Chinese numeral words (`三`, `十五`,
//! `一百零五`, `两百`), digit-by-digit readings (`一二`) and `点` decimals
//! (`三点五`).

fn digit_value(c: char) -> Option<u64> {
    match c {
        '0'..='9' => c.to_digit(10).map(u64::from),
        '零' | '〇' => Some(0),
        '一' => Some(1),
        '二' | '两' => Some(2),
        '三' => Some(3),
        '四' => Some(4),
        '五' => Some(5),
        '六' => Some(6),
        '七' => Some(7),
        '八' => Some(8),
        '九' => Some(9),
        _ => None,
    }
}

const fn unit_value(c: char) -> Option<u64> {
    match c {
        '十' => Some(10),
        '百' => Some(100),
        '千' => Some(1000),
        '万' => Some(10_000),
        _ => None,
    }
}

/// Parse a complete numeral; `None` if any part of it is malformed
#[must_use]
pub fn parse_numeral(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if text.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return text.parse().ok();
    }

    if let Some((int_part, frac_part)) = text.split_once('点') {
        let whole = parse_integer(int_part)?;
        if frac_part.is_empty() {
            return None;
        }
        let digits: String = frac_part
            .chars()
            .map(|c| digit_value(c).map(|d| d.to_string()))
            .collect::<Option<String>>()?;
        let frac: f64 = format!("0.{digits}").parse().ok()?;
        #[allow(clippy::cast_precision_loss)]
        return Some(whole as f64 + frac);
    }

    #[allow(clippy::cast_precision_loss)]
    parse_integer(text).map(|n| n as f64)
}

/// Parse the longest leading span of `text` that forms a valid numeral
///
/// Returns the value and the byte length consumed.
#[must_use]
pub fn longest_numeral_prefix(text: &str) -> Option<(f64, usize)> {
    let mut ends: Vec<usize> = text.char_indices().map(|(i, c)| i + c.len_utf8()).collect();
    ends.reverse();

    ends.into_iter()
        .find_map(|end| parse_numeral(&text[..end]).map(|value| (value, end)))
}

fn parse_integer(text: &str) -> Option<u64> {
    if text.is_empty() {
        return None;
    }

    // Digit-by-digit reading: "一二" is 12, "2" is 2
    if text.chars().all(|c| digit_value(c).is_some()) {
        return text
            .chars()
            .map(digit_value)
            .try_fold(0u64, |acc, d| acc.checked_mul(10)?.checked_add(d?));
    }

    let mut total = 0u64;
    let mut section = 0u64;
    let mut number: Option<u64> = None;
    let mut last_unit = u64::MAX;

    for c in text.chars() {
        if let Some(d) = digit_value(c) {
            if d == 0 {
                // 零 only bridges a gap, as in 一百零五
                if number.is_some() {
                    return None;
                }
                continue;
            }
            if number.is_some() {
                return None;
            }
            number = Some(d);
        } else if let Some(unit) = unit_value(c) {
            if unit == 10_000 {
                section += number.take().unwrap_or(0);
                if section == 0 {
                    return None;
                }
                total = total.checked_add(section.checked_mul(unit)?)?;
                section = 0;
                last_unit = u64::MAX;
                continue;
            }

            if unit >= last_unit {
                return None;
            }
            let n = match number.take() {
                Some(n) => n,
                // Leading 十 means one ten
                None if unit == 10 && section == 0 && total == 0 => 1,
                None => return None,
            };
            section += n * unit;
            last_unit = unit;
        } else {
            return None;
        }
    }

    total.checked_add(section + number.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(text: &str) -> Option<f64> {
        parse_numeral(text)
    }

    #[test]
    fn arabic_digits() {
        assert_eq!(n("3"), Some(3.0));
        assert_eq!(n("12"), Some(12.0));
        assert_eq!(n("2.5"), Some(2.5));
        assert_eq!(n("1.2.3"), None);
    }

    #[test]
    fn chinese_words() {
        assert_eq!(n("三"), Some(3.0));
        assert_eq!(n("两"), Some(2.0));
        assert_eq!(n("十"), Some(10.0));
        assert_eq!(n("十五"), Some(15.0));
        assert_eq!(n("二十"), Some(20.0));
        assert_eq!(n("九十"), Some(90.0));
        assert_eq!(n("一百"), Some(100.0));
        assert_eq!(n("一百二十"), Some(120.0));
        assert_eq!(n("一百零五"), Some(105.0));
        assert_eq!(n("两百"), Some(200.0));
        assert_eq!(n("一万二千"), Some(12_000.0));
    }

    #[test]
    fn digit_by_digit_and_decimals() {
        assert_eq!(n("一二"), Some(12.0));
        assert_eq!(n("三点五"), Some(3.5));
        assert_eq!(n("零"), Some(0.0));
    }

    #[test]
    fn malformed_rejected() {
        assert_eq!(n("十百"), None);
        assert_eq!(n("三四十"), None);
        assert_eq!(n("百"), None);
        assert_eq!(n("三点"), None);
        assert_eq!(n(""), None);
    }

    #[test]
    fn longest_valid_prefix_wins() {
        assert_eq!(
            longest_numeral_prefix("一百二十"),
            Some((120.0, "一百二十".len()))
        );
        // "三点" is incomplete, so only "三" is taken
        assert_eq!(longest_numeral_prefix("三点"), Some((3.0, "三".len())));
        assert_eq!(longest_numeral_prefix("十百"), Some((10.0, "十".len())));
        assert_eq!(longest_numeral_prefix("米"), None);
    }
}
