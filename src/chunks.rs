//! Genomic regions and the chunk ids used to bucket variants by position.
//!
//! Every stored variant carries two chunk ids in `_at.chunkIds`: one for the fine
//! 1,000 bp bin and one for the coarse 10,000 bp bin its start falls into.  Region
//! queries select candidate bins through these ids and then apply the exact overlap on
//! `start`/`end`.

use std::str::FromStr;

use crate::{err::ArgError, storage::Filter};

/// Size of fine chunks in bp.
pub const CHUNK_SIZE_SMALL: i32 = 1_000;
/// Size of coarse chunks in bp.
pub const CHUNK_SIZE_BIG: i32 = 10_000;
/// Regions spanning more than this many fine chunks are matched via coarse chunks.
pub const CHUNK_SWITCH_FACTOR: i64 = 50;

/// Path of the chunk ids in variant documents.
pub const CHUNK_IDS_FIELD: &str = "_at.chunkIds";

/// A genomic region, 1-based and fully closed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Region {
    pub chromosome: String,
    pub start: i32,
    pub end: i32,
}

impl Region {
    pub fn new(chromosome: &str, start: i32, end: i32) -> Self {
        Self {
            chromosome: chromosome.to_string(),
            start,
            end,
        }
    }

    /// The whole of `chromosome`.
    pub fn whole(chromosome: &str) -> Self {
        Self::new(chromosome, 0, i32::MAX)
    }

    pub fn is_whole_chromosome(&self) -> bool {
        self.start <= 0 && self.end == i32::MAX
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_whole_chromosome() {
            write!(f, "{}", self.chromosome)
        } else {
            write!(f, "{}:{}-{}", self.chromosome, self.start, self.end)
        }
    }
}

/// Parses `chr`, `chr:pos` and `chr:start-end`.
impl FromStr for Region {
    type Err = ArgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (chromosome, coords) = match s.split_once(':') {
            None => (s, None),
            Some((chromosome, coords)) => (chromosome, Some(coords)),
        };
        if chromosome.is_empty() {
            return Err(ArgError::RegionInvalidFormat(s.to_string()));
        }

        match coords {
            None => Ok(Region::whole(chromosome)),
            Some(coords) => {
                let (start, end) = match coords.split_once('-') {
                    None => {
                        let pos = coords.replace(',', "").parse::<i32>()?;
                        (pos, pos)
                    }
                    Some((start, end)) => (
                        start.replace(',', "").parse::<i32>()?,
                        end.replace(',', "").parse::<i32>()?,
                    ),
                };
                if start > end {
                    return Err(ArgError::RegionInvalidFormat(s.to_string()));
                }
                Ok(Region::new(chromosome, start, end))
            }
        }
    }
}

/// Id of the chunk of `size` bp containing `position` on `chromosome`.
pub fn chunk_id(chromosome: &str, position: i32, size: i32) -> String {
    format!("{}_{}_{}k", chromosome, position / size, size / 1_000)
}

/// Fine and coarse chunk ids for a variant starting at `start`.
pub fn chunk_ids_for_start(chromosome: &str, start: i32) -> Vec<String> {
    vec![
        chunk_id(chromosome, start, CHUNK_SIZE_SMALL),
        chunk_id(chromosome, start, CHUNK_SIZE_BIG),
    ]
}

/// Chunk ids covering `region`, coarse ones for wide regions.
pub fn chunk_ids_for_region(region: &Region) -> Vec<String> {
    let span = region.end as i64 - region.start as i64;
    let size = if span > CHUNK_SWITCH_FACTOR * CHUNK_SIZE_SMALL as i64 {
        CHUNK_SIZE_BIG
    } else {
        CHUNK_SIZE_SMALL
    };
    let first = region.start.max(0) / size;
    let last = region.end / size;
    (first..=last)
        .map(|chunk| format!("{}_{}_{}k", region.chromosome, chunk, size / 1_000))
        .collect()
}

/// Predicate selecting variants overlapping `region`.
pub fn region_filter(region: &Region) -> Filter {
    let chromosome = Filter::eq("chr", region.chromosome.as_str());
    if region.is_whole_chromosome() {
        return chromosome;
    }
    Filter::and(vec![
        Filter::Gte(String::from("end"), region.start as f64),
        Filter::Lte(String::from("start"), region.end as f64),
        Filter::is_in(CHUNK_IDS_FIELD, chunk_ids_for_region(region)),
        chromosome,
    ])
}

/// Predicate selecting variants overlapping any of `regions`.
pub fn regions_filter(regions: &[Region]) -> Filter {
    Filter::or(regions.iter().map(region_filter).collect())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[rstest::rstest]
    #[case("1", Region::whole("1"))]
    #[case("1:1000", Region::new("1", 1000, 1000))]
    #[case("X:1,000-2,000", Region::new("X", 1000, 2000))]
    #[case(" 22:5-10 ", Region::new("22", 5, 10))]
    fn region_from_str(#[case] input: &str, #[case] expected: Region) -> Result<(), anyhow::Error> {
        assert_eq!(input.parse::<Region>()?, expected);
        Ok(())
    }

    #[rstest::rstest]
    #[case(":1-2")]
    #[case("1:a-2")]
    #[case("1:5-2")]
    fn region_from_str_invalid(#[case] input: &str) {
        assert!(input.parse::<Region>().is_err());
    }

    #[test]
    fn region_display() {
        assert_eq!(Region::new("1", 5, 10).to_string(), "1:5-10");
        assert_eq!(Region::whole("MT").to_string(), "MT");
    }

    #[rstest::rstest]
    #[case(1000, &["1_1_1k", "1_0_10k"])]
    #[case(999, &["1_0_1k", "1_0_10k"])]
    #[case(25_000, &["1_25_1k", "1_2_10k"])]
    fn chunk_ids_of_variant(#[case] start: i32, #[case] expected: &[&str]) {
        assert_eq!(chunk_ids_for_start("1", start), expected);
    }

    #[test]
    fn chunk_ids_fine_region() {
        assert_eq!(
            chunk_ids_for_region(&Region::new("1", 900, 3100)),
            vec!["1_0_1k", "1_1_1k", "1_2_1k", "1_3_1k"]
        );
    }

    #[test]
    fn chunk_ids_coarse_region() {
        assert_eq!(
            chunk_ids_for_region(&Region::new("2", 5_000, 75_000)),
            vec![
                "2_0_10k", "2_1_10k", "2_2_10k", "2_3_10k", "2_4_10k", "2_5_10k", "2_6_10k",
                "2_7_10k"
            ]
        );
    }

    /// Every variant inside a region shares a chunk id with the region's id set.
    #[rstest::rstest]
    #[case(Region::new("1", 1, 40_000))]
    #[case(Region::new("1", 12_345, 123_456))]
    fn chunk_coverage(#[case] region: Region) {
        let region_ids = chunk_ids_for_region(&region);
        for start in (region.start..=region.end).step_by(997) {
            let variant_ids = chunk_ids_for_start("1", start);
            assert!(
                variant_ids.iter().any(|id| region_ids.contains(id)),
                "no overlap for {}",
                start
            );
        }
    }

    #[test]
    fn region_filter_matches_overlap_only() {
        let filter = region_filter(&Region::new("1", 1000, 1100));

        let doc = |chr: &str, start: i32, end: i32| {
            json!({
                "chr": chr,
                "start": start,
                "end": end,
                "_at": {"chunkIds": chunk_ids_for_start(chr, start)}
            })
        };
        assert!(filter.matches(&doc("1", 1000, 1000)));
        assert!(filter.matches(&doc("1", 1100, 1105)));
        assert!(!filter.matches(&doc("1", 1101, 1101)));
        assert!(!filter.matches(&doc("2", 1000, 1000)));
    }

    #[test]
    fn region_filter_whole_chromosome() {
        assert_eq!(region_filter(&Region::whole("3")), Filter::eq("chr", "3"));
    }

    #[test]
    fn regions_filter_is_disjunction() {
        let filter = regions_filter(&[Region::whole("1"), Region::whole("2")]);
        assert_eq!(
            filter,
            Filter::Or(vec![Filter::eq("chr", "1"), Filter::eq("chr", "2")])
        );
    }
}
