//! Bucket assignment: maps a (visitor, experiment) pair to one of the experiment's variants.
//!
//! Allocation is a pure function of its inputs. Nothing is stored per visitor: recomputing the
//! allocation on every request is what keeps a visitor in the same variant.

use serde::{Deserialize, Serialize};

use crate::{
    error::VariantSetError,
    experiment::Variant,
    sharder::{Fnv1aSharder, Sharder},
    Result,
};

/// Number of buckets visitors are spread over.
pub const TOTAL_BUCKETS: u32 = 100;

/// Buckets below this value are served the control variant under
/// [`AllocationPolicy::BinaryThreshold`].
pub const CONTROL_THRESHOLD: u32 = 50;

/// Separator between visitor id and experiment id in the allocation key.
pub const KEY_SEPARATOR: &str = ":";

/// How a bucket is turned into a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationPolicy {
    /// Buckets `[0, 50)` get the control, `[50, 100)` the first challenger. `trafficSplit` is
    /// ignored.
    #[default]
    BinaryThreshold,
    /// Control first, then the remaining variants in order, each owning a contiguous bucket range
    /// proportional to its `trafficSplit`.
    Weighted,
}

/// Outcome of allocating a visitor to an experiment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationResult {
    pub variant_id: String,
    /// Whether the visitor is in the control arm.
    pub is_control: bool,
    /// Raw bucket in `0..100`, for diagnostics only.
    pub bucket_value: u32,
}

/// Decision table row that selected the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    /// Control half, a variant flagged `isControl` exists.
    FlaggedControl,
    /// Control half, nothing is flagged: the first variant acts as control.
    FirstVariantAsControl,
    /// Challenger half, first variant not flagged `isControl`.
    FirstNonControl,
    /// Challenger half, every variant is flagged: the second variant is served.
    SecondVariantFallback,
    /// Challenger half of a single-variant experiment: the only variant is served.
    SoleVariantFallback,
    /// Weighted policy: the variant owning buckets `start..end`.
    WeightedRange { start: u32, end: u32 },
}

/// [`AllocationResult`] plus everything needed to explain it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationDetails {
    #[serde(flatten)]
    pub result: AllocationResult,
    pub allocation_key: String,
    /// Full 32-bit hash of the allocation key.
    pub hash: u32,
    pub policy: AllocationPolicy,
    pub resolution: Resolution,
}

/// Allocate a visitor with the default sharder and the binary-threshold policy.
///
/// ```
/// # use hypo::{allocate, Variant};
/// let variants = [
///     Variant::new("v_control", true, 50),
///     Variant::new("v_challenger", false, 50),
/// ];
/// let result = allocate("user_12345", "exp_abc99", &variants).unwrap();
/// assert_eq!(result.variant_id, "v_challenger");
/// assert_eq!(result.bucket_value, 86);
/// ```
pub fn allocate(
    visitor_id: &str,
    experiment_id: &str,
    variants: &[Variant],
) -> Result<AllocationResult> {
    Allocator::new(AllocationPolicy::BinaryThreshold).allocate(
        visitor_id,
        experiment_id,
        variants,
    )
}

/// Configured allocation engine.
///
/// Holds no per-visitor state, so one instance can be shared by any number of threads.
#[derive(Debug, Clone, Default)]
pub struct Allocator<S = Fnv1aSharder> {
    sharder: S,
    policy: AllocationPolicy,
}

impl Allocator<Fnv1aSharder> {
    pub fn new(policy: AllocationPolicy) -> Self {
        Self::with_sharder(Fnv1aSharder, policy)
    }
}

impl<S: Sharder> Allocator<S> {
    pub fn with_sharder(sharder: S, policy: AllocationPolicy) -> Self {
        Self { sharder, policy }
    }

    pub fn policy(&self) -> AllocationPolicy {
        self.policy
    }

    fn hash(&self, visitor_id: &str, experiment_id: &str) -> u32 {
        self.sharder.hash(&[visitor_id, KEY_SEPARATOR, experiment_id])
    }

    /// Bucket in `0..TOTAL_BUCKETS` for the pair.
    pub fn bucket(&self, visitor_id: &str, experiment_id: &str) -> u32 {
        self.hash(visitor_id, experiment_id) % TOTAL_BUCKETS
    }

    pub fn allocate(
        &self,
        visitor_id: &str,
        experiment_id: &str,
        variants: &[Variant],
    ) -> Result<AllocationResult> {
        let bucket = self.bucket(visitor_id, experiment_id);
        let selection = self.policy.resolve(bucket, variants)?;
        Ok(selection.into_result(bucket))
    }

    pub fn allocate_with_details(
        &self,
        visitor_id: &str,
        experiment_id: &str,
        variants: &[Variant],
    ) -> Result<AllocationDetails> {
        let hash = self.hash(visitor_id, experiment_id);
        let bucket = hash % TOTAL_BUCKETS;
        let selection = self.policy.resolve(bucket, variants)?;
        let resolution = selection.resolution;
        Ok(AllocationDetails {
            result: selection.into_result(bucket),
            allocation_key: [visitor_id, KEY_SEPARATOR, experiment_id].concat(),
            hash,
            policy: self.policy,
            resolution,
        })
    }
}

struct Selection<'a> {
    variant: &'a Variant,
    is_control: bool,
    resolution: Resolution,
}

impl Selection<'_> {
    fn into_result(self, bucket: u32) -> AllocationResult {
        AllocationResult {
            variant_id: self.variant.id.clone(),
            is_control: self.is_control,
            bucket_value: bucket,
        }
    }
}

impl AllocationPolicy {
    fn resolve(self, bucket: u32, variants: &[Variant]) -> Result<Selection<'_>> {
        match self {
            Self::BinaryThreshold => resolve_binary(bucket, variants),
            Self::Weighted => resolve_weighted(bucket, variants),
        }
    }
}

fn resolve_binary(bucket: u32, variants: &[Variant]) -> Result<Selection<'_>> {
    let Some(first) = variants.first() else {
        return Err(VariantSetError::Empty.into());
    };

    let (variant, resolution) = if bucket < CONTROL_THRESHOLD {
        match variants.iter().find(|v| v.is_control) {
            Some(control) => (control, Resolution::FlaggedControl),
            None => (first, Resolution::FirstVariantAsControl),
        }
    } else if let Some(challenger) = variants.iter().find(|v| !v.is_control) {
        (challenger, Resolution::FirstNonControl)
    } else if let Some(second) = variants.get(1) {
        (second, Resolution::SecondVariantFallback)
    } else {
        (first, Resolution::SoleVariantFallback)
    };

    Ok(Selection {
        variant,
        // The arm is decided by the bucket half, not by the served variant's flag.
        is_control: bucket < CONTROL_THRESHOLD,
        resolution,
    })
}

fn resolve_weighted(bucket: u32, variants: &[Variant]) -> Result<Selection<'_>> {
    if variants.is_empty() {
        return Err(VariantSetError::Empty.into());
    }
    if let Some(v) = variants.iter().find(|v| v.traffic_split > TOTAL_BUCKETS) {
        return Err(VariantSetError::SplitOutOfRange {
            variant_id: v.id.clone(),
            traffic_split: v.traffic_split,
        }
        .into());
    }

    let total: u64 = variants.iter().map(|v| u64::from(v.traffic_split)).sum();
    if total == 0 {
        return Err(VariantSetError::ZeroTotalWeight.into());
    }

    let control_index = variants.iter().position(|v| v.is_control).unwrap_or(0);
    let order =
        std::iter::once(control_index).chain((0..variants.len()).filter(|&i| i != control_index));

    // Variant i owns buckets b with `start * 100 <= b * total < end * 100`, where start..end is
    // its cumulative split range. With splits summing to 100 this is exactly start..end.
    let scaled = u64::from(bucket) * total;
    let to_bucket = |weight: u64| {
        let buckets = (weight * u64::from(TOTAL_BUCKETS)).div_ceil(total);
        buckets as u32
    };

    let mut cumulative = 0u64;
    for index in order {
        let variant = &variants[index];
        let start = cumulative;
        cumulative += u64::from(variant.traffic_split);
        if scaled < cumulative * u64::from(TOTAL_BUCKETS) {
            return Ok(Selection {
                variant,
                is_control: index == control_index,
                resolution: Resolution::WeightedRange {
                    start: to_bucket(start),
                    end: to_bucket(cumulative),
                },
            });
        }
    }

    // bucket < TOTAL_BUCKETS, so the last range always matches.
    Err(VariantSetError::ZeroTotalWeight.into())
}
