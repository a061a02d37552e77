// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Menu tree assembly.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::models::{Menu, MenuNode, MenuSortKey};

/// Build a forest from a flat menu list.
///
/// Duplicates (same id) collapse to one node. Only menus reachable from
/// parent `0` are kept; entries whose parent is missing are dropped.
pub fn build_menu_tree(menus: Vec<Menu>, sort: MenuSortKey) -> Vec<MenuNode> {
    let unique: BTreeMap<i64, Menu> = menus.into_iter().map(|m| (m.id, m)).collect();

    let mut children: HashMap<i64, Vec<&Menu>> = HashMap::new();
    for menu in unique.values() {
        children.entry(menu.parent_id).or_default().push(menu);
    }
    for siblings in children.values_mut() {
        siblings.sort_by(|a, b| compare(a, b, sort));
    }

    let mut visited = HashSet::new();
    attach(0, &children, &mut visited)
}

fn attach(parent_id: i64, children: &HashMap<i64, Vec<&Menu>>, visited: &mut HashSet<i64>) -> Vec<MenuNode> {
    let Some(siblings) = children.get(&parent_id) else {
        return Vec::new();
    };

    let mut nodes = Vec::with_capacity(siblings.len());
    for menu in siblings {
        // id 0 is the virtual root
        if menu.id == 0 || !visited.insert(menu.id) {
            continue;
        }
        let mut node = MenuNode::from(*menu);
        node.children = attach(menu.id, children, visited);
        nodes.push(node);
    }
    nodes
}

fn compare(a: &Menu, b: &Menu, sort: MenuSortKey) -> Ordering {
    let primary = match sort {
        MenuSortKey::Order => a.order.cmp(&b.order),
        MenuSortKey::Name => a.name.cmp(&b.name),
        MenuSortKey::Id => Ordering::Equal,
    };
    primary.then(a.id.cmp(&b.id))
}
