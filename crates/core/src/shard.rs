use serde::{Deserialize, Serialize};

use crate::{SyncError, SyncResult};

/// 一个分片：主键闭区间[start_id, end_id]
///
/// 由ShardPlanner产出后不可变，每次运行中恰好被一个worker消费一次。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShardRange {
    pub start_id: i64,
    pub end_id: i64,
}

impl ShardRange {
    pub fn new(start_id: i64, end_id: i64) -> Self {
        Self { start_id, end_id }
    }

    pub fn len(&self) -> i64 {
        self.end_id - self.start_id + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end_id < self.start_id
    }
}

/// 分片规划器
///
/// 把[min_id, max_id]切成concurrency个连续不重叠的等宽区间，余数并入
/// 最后一个区间。输出惰性可重算，规划器自身无状态。
pub struct ShardPlanner;

impl ShardPlanner {
    /// 规划分片序列
    ///
    /// min_id > max_id或concurrency <= 0时返回InvalidRange；
    /// 单行区间（min_id == max_id）无论并发因子多大都只产出一个分片。
    pub fn plan(min_id: i64, max_id: i64, concurrency: i64) -> SyncResult<ShardPlan> {
        if min_id > max_id || concurrency <= 0 {
            return Err(SyncError::InvalidRange {
                min_id,
                max_id,
                concurrency,
            });
        }

        let rows = max_id - min_id + 1;
        let shard_count = concurrency.min(rows);
        let width = rows / shard_count;

        Ok(ShardPlan {
            min_id,
            max_id,
            width,
            shard_count,
            next_index: 0,
        })
    }
}

/// 惰性分片序列，可从同一组边界重复计算
#[derive(Debug, Clone)]
pub struct ShardPlan {
    min_id: i64,
    max_id: i64,
    width: i64,
    shard_count: i64,
    next_index: i64,
}

impl Iterator for ShardPlan {
    type Item = ShardRange;

    fn next(&mut self) -> Option<ShardRange> {
        if self.next_index >= self.shard_count {
            return None;
        }
        let start = self.min_id + self.next_index * self.width;
        let end = if self.next_index == self.shard_count - 1 {
            // 最后一个分片吸收余数
            self.max_id
        } else {
            start + self.width - 1
        };
        self.next_index += 1;
        Some(ShardRange::new(start, end))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.shard_count - self.next_index).max(0) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ShardPlan {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_even_split() {
        let shards: Vec<ShardRange> = ShardPlanner::plan(1, 1000, 4).unwrap().collect();
        assert_eq!(
            shards,
            vec![
                ShardRange::new(1, 250),
                ShardRange::new(251, 500),
                ShardRange::new(501, 750),
                ShardRange::new(751, 1000),
            ]
        );
    }

    #[test]
    fn test_last_shard_absorbs_remainder() {
        let shards: Vec<ShardRange> = ShardPlanner::plan(1, 10, 3).unwrap().collect();
        assert_eq!(
            shards,
            vec![
                ShardRange::new(1, 3),
                ShardRange::new(4, 6),
                ShardRange::new(7, 10),
            ]
        );
    }

    #[test]
    fn test_single_row_range() {
        let shards: Vec<ShardRange> = ShardPlanner::plan(42, 42, 8).unwrap().collect();
        assert_eq!(shards, vec![ShardRange::new(42, 42)]);
    }

    #[test]
    fn test_invalid_range_rejected() {
        assert!(matches!(
            ShardPlanner::plan(10, 1, 4),
            Err(SyncError::InvalidRange { .. })
        ));
        assert!(matches!(
            ShardPlanner::plan(1, 10, 0),
            Err(SyncError::InvalidRange { .. })
        ));
        assert!(matches!(
            ShardPlanner::plan(1, 10, -1),
            Err(SyncError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_coverage_is_exact_and_non_overlapping() {
        for &(min, max, n) in &[(1i64, 1000i64, 7i64), (-50, 49, 10), (0, 0, 1), (5, 104, 100)] {
            let shards: Vec<ShardRange> = ShardPlanner::plan(min, max, n).unwrap().collect();
            let rows = max - min + 1;
            assert_eq!(shards.len() as i64, n.min(rows));
            // 连续且无重叠地覆盖全区间
            assert_eq!(shards.first().unwrap().start_id, min);
            assert_eq!(shards.last().unwrap().end_id, max);
            for pair in shards.windows(2) {
                assert_eq!(pair[1].start_id, pair[0].end_id + 1);
            }
            let total: i64 = shards.iter().map(|s| s.len()).sum();
            assert_eq!(total, rows);
        }
    }

    #[test]
    fn test_plan_is_restartable() {
        let a: Vec<ShardRange> = ShardPlanner::plan(1, 100, 3).unwrap().collect();
        let b: Vec<ShardRange> = ShardPlanner::plan(1, 100, 3).unwrap().collect();
        assert_eq!(a, b);
    }
}
