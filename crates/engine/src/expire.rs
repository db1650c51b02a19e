//! 시각 순 만료 스케줄러
//!
//! 항목을 만료 시각 오름차순으로 유지합니다. 같은 시각의 항목은 추가된
//! 순서를 유지합니다. 만료된 항목은 명시적인 실행 패스에서만 제거됩니다.
//!
//! - [`ExpiryList`]: 추가 전용 (리셋 명령 대기열)
//! - [`DedupExpiryList`]: 같은 항목을 다시 넣으면 만료 시각만 갱신
//!   (키별 발생 윈도우 만료)

use std::collections::VecDeque;

use reactd_core::types::Timestamp;

/// 만료 시각이 붙은 항목
#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry<T> {
    deadline: Timestamp,
    item: T,
}

/// 추가 전용 만료 목록
#[derive(Debug, Clone)]
pub struct ExpiryList<T> {
    entries: VecDeque<Entry<T>>,
}

impl<T> ExpiryList<T> {
    /// 빈 목록을 생성합니다.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// `now + delay_secs`에 만료되는 항목을 추가하고 만료 시각을 반환합니다.
    pub fn add(&mut self, item: T, now: Timestamp, delay_secs: u64) -> Timestamp {
        let deadline = now.saturating_add(delay_secs);
        self.insert_at(item, deadline);
        deadline
    }

    /// 만료 시각이 `now` 이하인 항목을 순서대로 제거하여 콜백에 넘깁니다.
    ///
    /// 처리한 항목 수를 반환합니다.
    pub fn run_expired(&mut self, now: Timestamp, mut on_expire: impl FnMut(T)) -> usize {
        let mut ran = 0;
        while let Some(item) = self.pop_expired(now) {
            on_expire(item);
            ran += 1;
        }
        ran
    }

    /// 만료된 항목이 있으면 가장 앞의 것을 제거하여 반환합니다.
    pub fn pop_expired(&mut self, now: Timestamp) -> Option<T> {
        if self.entries.front().is_some_and(|e| e.deadline <= now) {
            self.entries.pop_front().map(|e| e.item)
        } else {
            None
        }
    }

    /// 만료된 항목을 모두 제거하여 순서대로 반환합니다.
    pub fn drain_expired(&mut self, now: Timestamp) -> Vec<T> {
        let split = self.entries.partition_point(|e| e.deadline <= now);
        self.entries.drain(..split).map(|e| e.item).collect()
    }

    /// 가장 이른 만료 시각
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.entries.front().map(|e| e.deadline)
    }

    /// 대기 중인 항목 수
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 모든 항목을 버리고 버린 수를 반환합니다.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    /// (만료 시각, 항목)을 만료 순서대로 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, &T)> + '_ {
        self.entries.iter().map(|e| (e.deadline, &e.item))
    }

    fn insert_at(&mut self, item: T, deadline: Timestamp) {
        // 같은 시각이면 기존 항목 뒤에 둔다
        let idx = self.entries.partition_point(|e| e.deadline <= deadline);
        self.entries.insert(idx, Entry { deadline, item });
    }
}

impl<T> Default for ExpiryList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// 중복을 허용하지 않는 만료 목록
///
/// 같은 항목(`PartialEq`)을 다시 넣으면 새 항목을 추가하지 않고 기존 항목의
/// 만료 시각을 갱신하여 새 위치로 옮깁니다.
#[derive(Debug, Clone)]
pub struct DedupExpiryList<T> {
    inner: ExpiryList<T>,
}

impl<T: PartialEq> DedupExpiryList<T> {
    pub fn new() -> Self {
        Self {
            inner: ExpiryList::new(),
        }
    }

    /// 항목을 추가하거나 기존 항목의 만료 시각을 `now + delay_secs`로 갱신합니다.
    ///
    /// 같은 항목이 이미 있었다면 넘겨받은 `item`을 그대로 돌려줍니다.
    pub fn upsert(&mut self, item: T, now: Timestamp, delay_secs: u64) -> Option<T> {
        let deadline = now.saturating_add(delay_secs);
        let pos = self.inner.entries.iter().position(|e| e.item == item);
        let existing = pos.and_then(|pos| self.inner.entries.remove(pos));

        match existing {
            Some(entry) => {
                self.inner.insert_at(entry.item, deadline);
                Some(item)
            }
            None => {
                self.inner.insert_at(item, deadline);
                None
            }
        }
    }

    /// 같은 항목이 있으면 제거하여 반환합니다.
    pub fn remove(&mut self, item: &T) -> Option<T> {
        let pos = self.inner.entries.iter().position(|e| &e.item == item)?;
        self.inner.entries.remove(pos).map(|e| e.item)
    }

    /// 만료 시각이 `now` 이하인 항목을 순서대로 제거하여 콜백에 넘깁니다.
    pub fn run_expired(&mut self, now: Timestamp, on_expire: impl FnMut(T)) -> usize {
        self.inner.run_expired(now, on_expire)
    }

    pub fn pop_expired(&mut self, now: Timestamp) -> Option<T> {
        self.inner.pop_expired(now)
    }

    pub fn drain_expired(&mut self, now: Timestamp) -> Vec<T> {
        self.inner.drain_expired(now)
    }

    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.inner.next_deadline()
    }

    pub fn count(&self) -> usize {
        self.inner.count()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) -> usize {
        self.inner.clear()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, &T)> + '_ {
        self.inner.iter()
    }
}

impl<T: PartialEq> Default for DedupExpiryList<T> {
    fn default() -> Self {
        Self::new()
    }
}
