use crate::physics::collision_detection::pair_cache::PairCache;

/// Work range of one freshness sweep job; starts are 8-byte aligned so the
/// wide reads never split.
#[derive(Clone, Copy, Debug)]
pub struct FreshnessJob {
    pub start: usize,
    pub end: usize,
}

/// Finds stale collision pairs by scanning freshness bytes eight at a time
/// and reporting every slot that was not refreshed during the frame.
pub struct FreshnessChecker;

impl FreshnessChecker {
    /// Splits the mapping into jobs for the sweep. Job boundaries are
    /// rounded up to multiples of eight.
    pub fn create_jobs(mapping_count: usize, thread_count: usize) -> Vec<FreshnessJob> {
        let mut jobs = Vec::new();
        if mapping_count == 0 {
            return jobs;
        }
        if thread_count <= 1 {
            jobs.push(FreshnessJob {
                start: 0,
                end: mapping_count,
            });
            return jobs;
        }
        const JOBS_PER_THREAD: usize = 2;
        let job_count = (thread_count * JOBS_PER_THREAD).min(mapping_count);
        let pairs_per_job = mapping_count / job_count;
        let remainder = mapping_count - pairs_per_job * job_count;
        let mut previous_end = 0;
        let mut job_index = 0;
        while previous_end < mapping_count {
            let pairs_in_job = if job_index < remainder {
                pairs_per_job + 1
            } else {
                pairs_per_job
            };
            let next_end = (((previous_end + pairs_in_job) + 7) & !7).min(mapping_count);
            jobs.push(FreshnessJob {
                start: previous_end,
                end: next_end,
            });
            previous_end = next_end;
            job_index += 1;
        }
        jobs
    }

    /// Sweeps one region, appending the slot index of every stale pair.
    pub fn check_region(pair_cache: &PairCache, job: FreshnessJob, stale: &mut Vec<usize>) {
        let freshness = pair_cache.freshness_bytes();
        debug_assert!(job.start % 8 == 0 || job.start == job.end);
        let count = job.end - job.start;
        let wide_count = count >> 3;

        for wide_index in 0..wide_count {
            let base = job.start + (wide_index << 3);
            let batch = u64::from_le_bytes(freshness[base..base + 8].try_into().unwrap());
            if batch == u64::MAX {
                continue;
            }
            for byte in 0..8 {
                if (batch >> (byte * 8)) & 0xFF == 0 {
                    stale.push(base + byte);
                }
            }
        }
        for index in (job.start + (wide_count << 3))..job.end {
            if freshness[index] == 0 {
                stale.push(index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::collidables::collidable_reference::{
        CollidableMobility, CollidableReference,
    };
    use crate::physics::collision_detection::pair_cache::{CollidablePair, ConstraintCache};
    use crate::physics::handles::{BodyHandle, ConstraintHandle};
    use crate::utilities::pool::BufferPool;

    #[test]
    fn sweep_reports_exactly_the_untouched_slots() {
        let mut pool = BufferPool::new();
        let mut cache = PairCache::new();
        for i in 0..21 {
            cache.add(
                CollidablePair::new(
                    CollidableReference::body(CollidableMobility::Dynamic, BodyHandle(i * 2)),
                    CollidableReference::body(CollidableMobility::Dynamic, BodyHandle(i * 2 + 1)),
                ),
                ConstraintCache {
                    constraint_handle: ConstraintHandle(i),
                    ..Default::default()
                },
            );
        }
        cache.prepare(&mut pool).unwrap();
        for slot in 0..21 {
            if slot % 3 != 0 {
                let cached = *cache.cache_at(slot);
                cache.update(slot, cached);
            }
        }

        let mut stale = Vec::new();
        for job in FreshnessChecker::create_jobs(cache.count(), 4) {
            FreshnessChecker::check_region(&cache, job, &mut stale);
        }
        let expected: Vec<usize> = (0..21).filter(|slot| slot % 3 == 0).collect();
        assert_eq!(stale, expected);
        cache.postflush(&mut pool);
    }

    #[test]
    fn job_starts_stay_aligned() {
        for count in [1usize, 7, 8, 9, 63, 64, 65, 1000] {
            let jobs = FreshnessChecker::create_jobs(count, 4);
            assert_eq!(jobs.first().unwrap().start, 0);
            assert_eq!(jobs.last().unwrap().end, count);
            for window in jobs.windows(2) {
                assert_eq!(window[0].end, window[1].start);
                assert_eq!(window[1].start % 8, 0);
            }
        }
    }
}
