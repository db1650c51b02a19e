//! 고정 용량 링 버퍼
//!
//! [`RingBuffer`]는 키별 발생 시각 윈도우를 저장합니다. 용량을 넘는 삽입은
//! 가장 오래된 값을 밀어내고 그 값을 돌려줍니다.
//!
//! 논리 인덱스 `i` (0 = 가장 오래된 값)는 물리 슬롯
//! `(start + i) % capacity`에 대응합니다.

use crate::error::EngineError;

/// 고정 용량 순환 버퍼
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    /// 물리 저장소 (길이 = 용량)
    slots: Box<[Option<T>]>,
    /// 가장 오래된 값의 물리 인덱스
    start: usize,
    /// 저장된 값 수
    count: usize,
}

impl<T> RingBuffer<T> {
    /// 주어진 용량의 빈 버퍼를 생성합니다.
    ///
    /// 용량이 0이면 [`EngineError::ZeroCapacity`]를 반환합니다.
    pub fn new(capacity: usize) -> Result<Self, EngineError> {
        if capacity == 0 {
            return Err(EngineError::ZeroCapacity);
        }
        Ok(Self {
            slots: empty_slots(capacity),
            start: 0,
            count: 0,
        })
    }

    /// 값을 가장 새로운 위치에 추가합니다.
    ///
    /// 버퍼가 가득 차 있으면 가장 오래된 값을 제거하여 반환합니다.
    pub fn put(&mut self, value: T) -> Option<T> {
        let capacity = self.capacity();
        if self.count == capacity {
            let evicted = self.slots[self.start].replace(value);
            self.start = (self.start + 1) % capacity;
            evicted
        } else {
            let slot = self.physical(self.count);
            self.slots[slot] = Some(value);
            self.count += 1;
            None
        }
    }

    /// 가장 오래된 값을 참조합니다.
    pub fn oldest(&self) -> Option<&T> {
        self.get(0)
    }

    /// 가장 새로운 값을 참조합니다.
    pub fn newest(&self) -> Option<&T> {
        self.count.checked_sub(1).and_then(|last| self.get(last))
    }

    /// 논리 인덱스로 값을 참조합니다 (0 = 가장 오래된 값).
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.count {
            return None;
        }
        self.slots[self.physical(index)].as_ref()
    }

    /// 가장 오래된 값을 제거하여 반환합니다.
    pub fn take_oldest(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        let value = self.slots[self.start].take();
        self.start = (self.start + 1) % self.capacity();
        self.count -= 1;
        value
    }

    /// 가장 새로운 값을 제거하여 반환합니다.
    pub fn take_newest(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        let slot = self.physical(self.count - 1);
        self.count -= 1;
        self.slots[slot].take()
    }

    /// 용량을 변경합니다.
    ///
    /// 새 용량이 0이거나 현재 저장된 값 수보다 작으면 아무것도 바꾸지 않고
    /// `false`를 반환합니다. 성공하면 값들을 새 저장소의 앞쪽부터
    /// 오래된 순으로 재배치합니다.
    pub fn resize(&mut self, new_capacity: usize) -> bool {
        if new_capacity == 0 || new_capacity < self.count {
            return false;
        }
        if new_capacity == self.capacity() {
            return true;
        }

        let mut slots = empty_slots(new_capacity);
        for (dst, idx) in (0..self.count).enumerate() {
            let src = self.physical(idx);
            slots[dst] = self.slots[src].take();
        }
        self.slots = slots;
        self.start = 0;
        true
    }

    /// 오래된 순서로 값을 순회합니다.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        (0..self.count).filter_map(move |idx| self.slots[self.physical(idx)].as_ref())
    }

    /// 모든 값을 제거합니다. 용량은 유지됩니다.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.start = 0;
        self.count = 0;
    }

    /// 저장된 값 수
    pub fn count(&self) -> usize {
        self.count
    }

    /// 최대 용량
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// 가득 찼는지 여부
    pub fn is_full(&self) -> bool {
        self.count == self.capacity()
    }

    fn physical(&self, index: usize) -> usize {
        (self.start + index) % self.capacity()
    }
}

impl<T: Copy + Ord + std::ops::Sub<Output = T>> RingBuffer<T> {
    /// 가장 새로운 값과 가장 오래된 값의 차이(절댓값)를 반환합니다.
    ///
    /// 시각 윈도우의 폭을 구할 때 사용합니다. 비어 있으면 `None`입니다.
    pub fn span(&self) -> Option<T> {
        match (self.newest(), self.oldest()) {
            (Some(&newest), Some(&oldest)) => Some(newest.max(oldest) - newest.min(oldest)),
            _ => None,
        }
    }
}

fn empty_slots<T>(capacity: usize) -> Box<[Option<T>]> {
    std::iter::repeat_with(|| None).take(capacity).collect()
}
