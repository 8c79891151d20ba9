// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! An exact-match radix trie keyed by the bit encoding of a route entry key.
//!
//! This is a crit-bit trie: every branch records the index of the first bit
//! at which the keys beneath it disagree, and every leaf holds a full key.  A
//! branch's bit index is always greater than that of its parent.  Because the
//! encoding has a fixed width, no key is a prefix of another and every key
//! lives in a leaf.
//!
//! In-order traversal visits keys in ascending order of their encodings, which
//! is also the `Ord` order of [`RouteEntryKey`].

use common::mcast::RouteEntryKey;

type Bits = [u8; RouteEntryKey::ENCODED_LEN];

fn bit_at(bits: &Bits, n: u16) -> usize {
    let byte = bits[usize::from(n / 8)];
    usize::from((byte >> (7 - (n % 8))) & 1)
}

// The index of the first bit at which two encodings differ
fn first_diff(a: &Bits, b: &Bits) -> Option<u16> {
    a.iter().zip(b.iter()).enumerate().find_map(|(i, (x, y))| {
        let d = x ^ y;
        (d != 0).then(|| (i * 8) as u16 + d.leading_zeros() as u16)
    })
}

struct Leaf<V> {
    key: RouteEntryKey,
    bits: Bits,
    value: V,
}

enum Node<V> {
    Leaf(Leaf<V>),
    Branch {
        bit: u16,
        children: [Box<Node<V>>; 2],
    },
}

// Follow the bits of the key down to a leaf.  The leaf holds the key if it is
// present at all.
fn best_match<'a, V>(mut node: &'a Node<V>, bits: &Bits) -> &'a Leaf<V> {
    loop {
        match node {
            Node::Leaf(leaf) => return leaf,
            Node::Branch { bit, children } => {
                node = &*children[bit_at(bits, *bit)]
            }
        }
    }
}

fn leftmost<V>(mut node: &Node<V>) -> &Leaf<V> {
    loop {
        match node {
            Node::Leaf(leaf) => return leaf,
            Node::Branch { children, .. } => node = &*children[0],
        }
    }
}

// Insert a leaf whose first difference from every key in the subtree it
// belongs to is at `crit`.
fn insert_at<V>(node: Box<Node<V>>, leaf: Leaf<V>, crit: u16) -> Box<Node<V>> {
    match *node {
        Node::Branch {
            bit,
            children: [left, right],
        } if bit < crit => {
            let children = if bit_at(&leaf.bits, bit) == 0 {
                [insert_at(left, leaf, crit), right]
            } else {
                [left, insert_at(right, leaf, crit)]
            };
            Box::new(Node::Branch { bit, children })
        }
        other => {
            let dir = bit_at(&leaf.bits, crit);
            let existing = Box::new(other);
            let new = Box::new(Node::Leaf(leaf));
            let children = if dir == 0 {
                [new, existing]
            } else {
                [existing, new]
            };
            Box::new(Node::Branch {
                bit: crit,
                children,
            })
        }
    }
}

// Remove the leaf matching `bits` from the subtree.  A branch left with a
// single child is replaced by that child.
fn remove_at<V>(
    node: Box<Node<V>>,
    bits: &Bits,
) -> (Option<Box<Node<V>>>, Option<V>) {
    match *node {
        Node::Leaf(leaf) => {
            if leaf.bits == *bits {
                (None, Some(leaf.value))
            } else {
                (Some(Box::new(Node::Leaf(leaf))), None)
            }
        }
        Node::Branch {
            bit,
            children: [left, right],
        } => {
            if bit_at(bits, bit) == 0 {
                match remove_at(left, bits) {
                    (None, v) => (Some(right), v),
                    (Some(left), v) => (
                        Some(Box::new(Node::Branch {
                            bit,
                            children: [left, right],
                        })),
                        v,
                    ),
                }
            } else {
                match remove_at(right, bits) {
                    (None, v) => (Some(left), v),
                    (Some(right), v) => (
                        Some(Box::new(Node::Branch {
                            bit,
                            children: [left, right],
                        })),
                        v,
                    ),
                }
            }
        }
    }
}

pub struct RouteTrie<V> {
    root: Option<Box<Node<V>>>,
    len: usize,
}

impl<V> Default for RouteTrie<V> {
    fn default() -> Self {
        RouteTrie { root: None, len: 0 }
    }
}

impl<V> RouteTrie<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a value.  If the key is already present the trie is unchanged
    /// and the value is handed back.
    pub fn insert(&mut self, key: RouteEntryKey, value: V) -> Result<(), V> {
        let bits = key.encode();
        let leaf = Leaf { key, bits, value };
        let root = match self.root.take() {
            Some(root) => root,
            None => {
                self.root = Some(Box::new(Node::Leaf(leaf)));
                self.len = 1;
                return Ok(());
            }
        };

        let crit = first_diff(&best_match(&root, &bits).bits, &bits);
        match crit {
            Some(crit) => {
                self.root = Some(insert_at(root, leaf, crit));
                self.len += 1;
                Ok(())
            }
            None => {
                self.root = Some(root);
                Err(leaf.value)
            }
        }
    }

    pub fn get(&self, key: &RouteEntryKey) -> Option<&V> {
        let bits = key.encode();
        let leaf = best_match(self.root.as_deref()?, &bits);
        (leaf.bits == bits).then_some(&leaf.value)
    }

    pub fn get_mut(&mut self, key: &RouteEntryKey) -> Option<&mut V> {
        let bits = key.encode();
        let mut node = self.root.as_deref_mut()?;
        loop {
            match node {
                Node::Leaf(leaf) => {
                    return (leaf.bits == bits).then_some(&mut leaf.value)
                }
                Node::Branch { bit, children } => {
                    node = &mut *children[bit_at(&bits, *bit)]
                }
            }
        }
    }

    pub fn contains_key(&self, key: &RouteEntryKey) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &RouteEntryKey) -> Option<V> {
        let bits = key.encode();
        let (root, removed) = remove_at(self.root.take()?, &bits);
        self.root = root;
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// The entry with the smallest key.
    pub fn first(&self) -> Option<(&RouteEntryKey, &V)> {
        let leaf = leftmost(self.root.as_deref()?);
        Some((&leaf.key, &leaf.value))
    }

    /// The entry with the smallest key strictly greater than `key`.  `key`
    /// itself need not be present.
    pub fn successor(
        &self,
        key: &RouteEntryKey,
    ) -> Option<(&RouteEntryKey, &V)> {
        let bits = key.encode();
        let root = self.root.as_deref()?;
        let crit = first_diff(&best_match(root, &bits).bits, &bits);

        // Descend along the key's path, stopping at the first node whose
        // leaves all differ from the key at `crit`.  Remember the right
        // sibling of the deepest left turn along the way.
        let mut node = root;
        let mut right_of_last_left = None;
        loop {
            match node {
                Node::Branch { bit, children }
                    if crit.map_or(true, |c| *bit < c) =>
                {
                    let dir = bit_at(&bits, *bit);
                    if dir == 0 {
                        right_of_last_left = Some(&*children[1]);
                    }
                    node = &*children[dir];
                }
                _ => break,
            }
        }

        let next = match crit {
            // Everything under `node` is greater than the key
            Some(c) if bit_at(&bits, c) == 0 => Some(node),
            _ => right_of_last_left,
        };
        next.map(|n| {
            let leaf = leftmost(n);
            (&leaf.key, &leaf.value)
        })
    }

    /// Iterate over all entries in key order.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            trie: self,
            last: None,
            started: false,
        }
    }
}

pub struct Iter<'a, V> {
    trie: &'a RouteTrie<V>,
    last: Option<&'a RouteEntryKey>,
    started: bool,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a RouteEntryKey, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let next = match (self.started, self.last) {
            (false, _) => self.trie.first(),
            (true, Some(k)) => self.trie.successor(k),
            (true, None) => None,
        };
        self.started = true;
        self.last = next.map(|(k, _)| k);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::mcast::EntryKind;
    use rand::seq::SliceRandom;
    use std::collections::BTreeMap;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    fn sg(vrf: u64, group: u8, source: u8) -> RouteEntryKey {
        RouteEntryKey::sg(
            0,
            vrf,
            IpAddr::V4(Ipv4Addr::new(224, 0, 0, group)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, source)),
        )
    }

    fn xg(vrf: u64, group: u8) -> RouteEntryKey {
        RouteEntryKey::xg(0, vrf, IpAddr::V4(Ipv4Addr::new(224, 0, 0, group)))
    }

    fn keys() -> Vec<RouteEntryKey> {
        let mut keys = Vec::new();
        for vrf in 0..3 {
            for group in [1, 2, 77, 200] {
                keys.push(xg(vrf, group));
                for source in [1, 9, 128] {
                    keys.push(sg(vrf, group, source));
                }
            }
            keys.push(RouteEntryKey::sg(
                0,
                vrf,
                IpAddr::V6(Ipv6Addr::new(0xff0e, 0, 0, 0, 0, 0, 0, 1)),
                IpAddr::V6(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1)),
            ));
        }
        keys
    }

    #[test]
    fn test_insert_find_remove() {
        let mut trie = RouteTrie::new();
        let k = sg(1, 1, 1);
        assert!(trie.insert(k, 1).is_ok());
        assert_eq!(trie.insert(k, 2), Err(2));
        assert_eq!(trie.get(&k), Some(&1));
        assert_eq!(trie.remove(&k), Some(1));
        assert_eq!(trie.remove(&k), None);
        assert!(trie.insert(k, 3).is_ok());
        assert_eq!(trie.get(&k), Some(&3));
        assert_eq!(trie.len(), 1);
    }

    #[test]
    fn test_wildcard_source_ignored() {
        let mut trie = RouteTrie::new();
        let k = xg(1, 5);
        trie.insert(k, "xg").unwrap();

        let mut other = k;
        other.source = IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1));
        assert_eq!(trie.get(&other), Some(&"xg"));
        assert!(trie.insert(other, "dup").is_err());

        // An (S, G) key with the same group and source is a different entry
        let mut sg_key = other;
        sg_key.kind = EntryKind::Sg;
        assert!(trie.get(&sg_key).is_none());
        trie.insert(sg_key, "sg").unwrap();
        assert_eq!(trie.len(), 2);
    }

    // Matches a BTreeMap model through random inserts and removals, in both
    // contents and order.
    #[test]
    fn test_against_model() {
        let mut rng = rand::thread_rng();
        let mut keys = keys();
        let mut trie = RouteTrie::new();
        let mut model = BTreeMap::new();

        for round in 0..4 {
            keys.shuffle(&mut rng);
            for (i, k) in keys.iter().enumerate() {
                if (i + round) % 3 == 0 {
                    assert_eq!(trie.remove(k), model.remove(k));
                } else {
                    let fresh = model.insert(*k, i).is_none();
                    if fresh {
                        assert!(trie.insert(*k, i).is_ok());
                    } else {
                        *trie.get_mut(k).unwrap() = i;
                    }
                }
            }
            assert_eq!(trie.len(), model.len());
            let walked: Vec<_> =
                trie.iter().map(|(k, v)| (*k, *v)).collect();
            let expected: Vec<_> =
                model.iter().map(|(k, v)| (*k, *v)).collect();
            assert_eq!(walked, expected);
        }
    }

    #[test]
    fn test_successor_of_absent_key() {
        let mut trie = RouteTrie::new();
        let all = keys();
        for (i, k) in all.iter().enumerate() {
            if i % 2 == 0 {
                trie.insert(*k, ()).unwrap();
            }
        }

        let mut sorted = all.clone();
        sorted.sort();
        for probe in &sorted {
            let expected = sorted
                .iter()
                .filter(|k| *k > probe && trie.contains_key(k))
                .min();
            assert_eq!(trie.successor(probe).map(|(k, _)| k), expected);
        }
    }

    #[test]
    fn test_empty() {
        let mut trie: RouteTrie<()> = RouteTrie::new();
        assert!(trie.first().is_none());
        assert!(trie.successor(&xg(0, 1)).is_none());
        assert!(trie.remove(&xg(0, 1)).is_none());
        assert_eq!(trie.iter().count(), 0);
    }
}
