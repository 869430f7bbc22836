//! Collapse multi-release chapter lists into one reading order.
//!
//! Several scanlation groups can release the same chapter number. We keep the newest release per
//! ordinal and sort ascending, whatever order the source paginated in.

use crate::model::ChapterRecord;
use std::collections::HashMap;

/// One record per distinct ordinal (the greatest `created_at`; the first one seen wins ties),
/// sorted by ascending ordinal. Records with a non-finite ordinal are dropped.
pub fn dedup_chapters<I>(records: I) -> Vec<ChapterRecord>
where
    I: IntoIterator<Item = ChapterRecord>,
{
    let mut kept: Vec<ChapterRecord> = Vec::new();
    let mut slot_by_ordinal: HashMap<u32, usize> = HashMap::new();

    for record in records {
        if !record.ordinal.is_finite() {
            log::warn!(
                "dropping chapter {} with unusable number {}",
                record.key,
                record.ordinal
            );
            continue;
        }
        match slot_by_ordinal.get(&ordinal_bits(record.ordinal)) {
            Some(&slot) => {
                if record.created_at > kept[slot].created_at {
                    kept[slot] = record;
                }
            }
            None => {
                slot_by_ordinal.insert(ordinal_bits(record.ordinal), kept.len());
                kept.push(record);
            }
        }
    }

    // Stable sort; ordinals are unique at this point anyway.
    kept.sort_by(|a, b| a.ordinal.total_cmp(&b.ordinal));
    kept
}

/// Grouping key. `-0.0` and `0.0` are the same chapter.
fn ordinal_bits(ordinal: f32) -> u32 {
    if ordinal == 0.0 {
        0.0f32.to_bits()
    } else {
        ordinal.to_bits()
    }
}

/// Display name in the "Chapter 12.5: Title" form. Whole numbers print without a fraction.
pub fn chapter_title(ordinal: f32, name: Option<&str>) -> String {
    let number = if ordinal.fract() == 0.0 {
        format!("{}", ordinal as i64)
    } else {
        format!("{}", ordinal)
    };
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => format!("Chapter {}: {}", number, n),
        None => format!("Chapter {}", number),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(ordinal: f32, created_at: i64, group: &str) -> ChapterRecord {
        ChapterRecord {
            key: format!("{}-{}", ordinal, group),
            ordinal,
            name: format!("Chapter {}", ordinal),
            created_at,
            scanlator: Some(group.to_string()),
            url: format!("/c/{}/{}", ordinal, group),
        }
    }

    #[test]
    fn keeps_newest_release_per_ordinal() {
        let input = vec![
            chapter(2.0, 100, "alpha"),
            chapter(2.0, 300, "beta"),
            chapter(2.0, 200, "gamma"),
            chapter(1.0, 50, "alpha"),
        ];
        let out = dedup_chapters(input);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].ordinal, 1.0);
        assert_eq!(out[1].ordinal, 2.0);
        assert_eq!(out[1].scanlator.as_deref(), Some("beta"));
        assert_eq!(out[1].created_at, 300);
    }

    #[test]
    fn output_is_strictly_ascending_for_newest_first_input() {
        let input: Vec<ChapterRecord> = (0..50)
            .rev()
            .flat_map(|n| {
                let ord = n as f32 / 2.0;
                vec![chapter(ord, n as i64, "a"), chapter(ord, n as i64 + 1, "b")]
            })
            .collect();
        let out = dedup_chapters(input);
        assert_eq!(out.len(), 50);
        assert!(out.windows(2).all(|w| w[0].ordinal < w[1].ordinal));
        assert!(out.iter().all(|c| c.scanlator.as_deref() == Some("b")));
    }

    #[test]
    fn ties_keep_the_first_seen_record() {
        let input = vec![chapter(3.0, 10, "first"), chapter(3.0, 10, "second")];
        let out = dedup_chapters(input);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].scanlator.as_deref(), Some("first"));
    }

    #[test]
    fn fractional_ordinals_are_distinct_chapters() {
        let input = vec![chapter(10.5, 1, "a"), chapter(10.0, 1, "a"), chapter(11.0, 1, "a")];
        let ordinals: Vec<f32> = dedup_chapters(input).iter().map(|c| c.ordinal).collect();
        assert_eq!(ordinals, vec![10.0, 10.5, 11.0]);
    }

    #[test]
    fn negative_zero_groups_with_zero_and_nan_is_dropped() {
        let input = vec![chapter(0.0, 1, "a"), chapter(-0.0, 2, "b"), chapter(f32::NAN, 3, "c")];
        let out = dedup_chapters(input);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].scanlator.as_deref(), Some("b"));
    }

    #[test]
    fn gaps_are_tolerated() {
        let input = vec![chapter(5.0, 1, "a"), chapter(1.0, 1, "a")];
        let ordinals: Vec<f32> = dedup_chapters(input).iter().map(|c| c.ordinal).collect();
        assert_eq!(ordinals, vec![1.0, 5.0]);
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(dedup_chapters(Vec::new()).is_empty());
    }

    #[test]
    fn titles() {
        assert_eq!(chapter_title(12.0, Some("The Gate")), "Chapter 12: The Gate");
        assert_eq!(chapter_title(12.5, None), "Chapter 12.5");
        assert_eq!(chapter_title(3.0, Some("  ")), "Chapter 3");
    }
}
