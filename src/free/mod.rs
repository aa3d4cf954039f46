//! free — free-лист страниц.
//!
//! В памяти — множество свободных page_id. На диске список живёт только в
//! чистом состоянии: при sync() он раскладывается по trunk-страницам, которые сами
//! берутся из свободного множества (trunk = свободная страница, перечисляющая другие).
//!
//! Политика:
//! - pop() отдаёт наименьший id (локальность, детерминированные тесты);
//! - страница либо в использовании, либо в списке, но не в обоих.

use std::collections::BTreeSet;

use crate::error::PageNumber;

#[derive(Debug, Clone, Default)]
pub struct FreeList {
    ids: BTreeSet<PageNumber>,
}

/// One trunk page of the persisted list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrunkPlan {
    pub page: PageNumber,
    pub ids: Vec<PageNumber>,
    pub next: PageNumber,
}

impl FreeList {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.ids.len() as u64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[inline]
    pub fn contains(&self, pid: PageNumber) -> bool {
        self.ids.contains(&pid)
    }

    /// false если id уже был в списке.
    pub fn push(&mut self, pid: PageNumber) -> bool {
        self.ids.insert(pid)
    }

    pub fn pop(&mut self) -> Option<PageNumber> {
        self.ids.pop_first()
    }

    pub fn iter(&self) -> impl Iterator<Item = PageNumber> + '_ {
        self.ids.iter().copied()
    }

    /// Разложить список по trunk'ам. Каждый trunk вмещает `capacity` id;
    /// trunk'и — наибольшие id множества, остальные перечислены в них.
    pub fn plan_trunks(&self, capacity: usize, no_page: PageNumber) -> Vec<TrunkPlan> {
        let n = self.ids.len();
        if n == 0 {
            return Vec::new();
        }
        debug_assert!(capacity > 0);
        let trunks = n.div_ceil(capacity + 1);
        let all: Vec<PageNumber> = self.ids.iter().copied().collect();
        let (listed, trunk_ids) = all.split_at(n - trunks);

        let mut plans = Vec::with_capacity(trunks);
        let mut chunks = listed.chunks(capacity);
        for (i, &page) in trunk_ids.iter().enumerate() {
            let ids = chunks.next().map(|c| c.to_vec()).unwrap_or_default();
            let next = trunk_ids.get(i + 1).copied().unwrap_or(no_page);
            plans.push(TrunkPlan { page, ids, next });
        }
        plans
    }
}

impl FromIterator<PageNumber> for FreeList {
    fn from_iter<T: IntoIterator<Item = PageNumber>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: u64 = u64::MAX;

    #[test]
    fn push_pop_lowest_first() {
        let mut fl = FreeList::new();
        assert!(fl.push(9));
        assert!(fl.push(3));
        assert!(!fl.push(9));
        assert_eq!(fl.len(), 2);
        assert_eq!(fl.pop(), Some(3));
        assert_eq!(fl.pop(), Some(9));
        assert_eq!(fl.pop(), None);
    }

    #[test]
    fn trunks_cover_every_id_once() {
        let fl: FreeList = (10..30).collect();
        let plans = fl.plan_trunks(4, NONE);
        // 20 ids, 5 per trunk (self + 4 listed) => 4 trunks.
        assert_eq!(plans.len(), 4);
        let mut seen: Vec<u64> = plans.iter().map(|p| p.page).collect();
        for p in &plans {
            assert!(p.ids.len() <= 4);
            seen.extend(&p.ids);
        }
        seen.sort_unstable();
        assert_eq!(seen, (10..30).collect::<Vec<_>>());
        assert_eq!(plans.last().unwrap().next, NONE);
        assert_eq!(plans[0].next, plans[1].page);
    }

    #[test]
    fn single_free_page_is_its_own_trunk() {
        let fl: FreeList = [5u64].into_iter().collect();
        let plans = fl.plan_trunks(506, NONE);
        assert_eq!(plans, vec![TrunkPlan { page: 5, ids: vec![], next: NONE }]);
        assert!(FreeList::new().plan_trunks(506, NONE).is_empty());
    }
}
