//! 키별 발생 추적기
//!
//! 규칙마다 하나의 [`HitTracker`]를 가지며, 키마다 발생 시각 링 버퍼를
//! 소유합니다. 항목은 첫 발생 때 만들어지고 만료 스케줄러가 삭제할 때만
//! 사라집니다.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use reactd_core::types::Timestamp;

use crate::error::EngineError;
use crate::ring::RingBuffer;

/// 키 → 발생 시각 윈도우
///
/// 키 순회 순서는 바이트 순으로 결정적입니다.
#[derive(Debug, Default)]
pub struct HitTracker {
    entries: BTreeMap<String, RingBuffer<Timestamp>>,
}

impl HitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 키의 윈도우를 찾거나 `window_capacity` 용량으로 새로 만듭니다.
    ///
    /// 두 번째 값은 새로 만들었는지 여부입니다.
    pub fn find_or_create(
        &mut self,
        key: &str,
        window_capacity: usize,
    ) -> Result<(&mut RingBuffer<Timestamp>, bool), EngineError> {
        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(entry) => Ok((entry.into_mut(), false)),
            Entry::Vacant(entry) => {
                let ring = RingBuffer::new(window_capacity)?;
                Ok((entry.insert(ring), true))
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&RingBuffer<Timestamp>> {
        self.entries.get(key)
    }

    /// 키의 윈도우를 제거하여 반환합니다.
    pub fn delete(&mut self, key: &str) -> Option<RingBuffer<Timestamp>> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    /// 모든 윈도우를 제거하고 제거한 수를 반환합니다.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }
}
