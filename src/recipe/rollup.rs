//! Material rollup: expands a recipe into base materials.
//!
//! `Direct` looks one level down. `Deep` recurses until every branch ends in an
//! item without a recipe, a key already on the expansion stack (cycle), or a
//! node past one of the [`RollupLimits`]. Each cut is recorded as a
//! [`LimitEvent`] and logged; it never fails the query.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::{CoreError, CoreResult};
use crate::recipe::fetcher::{fetch_recipe, Recipe, RecipeSource};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollupMode {
    #[default]
    Direct,
    Deep,
}

impl RollupMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Deep => "deep",
        }
    }
}

impl fmt::Display for RollupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RollupMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "deep" => Ok(Self::Deep),
            other => Err(format!("unknown rollup mode '{other}' (expected direct or deep)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollupLimits {
    pub max_depth: usize,
    pub max_unique_materials: usize,
}

impl Default for RollupLimits {
    fn default() -> Self {
        Self {
            max_depth: 20,
            max_unique_materials: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    Cycle,
    Depth,
    UniqueMaterials,
}

/// A node that was treated as a base material because expansion was cut short.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitEvent {
    pub kind: LimitKind,
    pub key: String,
    pub depth: usize,
    /// For a cycle, the other keys on the loop in expansion order. Empty for other cuts.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
}

/// Raw (pre-bonus) rollup result. Materials keep first-discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Rollup {
    pub item: String,
    pub quantity: u64,
    pub mode: RollupMode,
    pub materials: IndexMap<String, u64>,
    pub events: Vec<LimitEvent>,
    pub recipe_lookups: usize,
}

/// Roll `quantity` of `item` up into base materials.
pub fn rollup<S: RecipeSource + ?Sized>(
    source: &S,
    item: &str,
    quantity: u64,
    mode: RollupMode,
    limits: &RollupLimits,
    cancel: &CancelToken,
) -> CoreResult<Rollup> {
    let key = source.resolve(item);
    let mut expansion = Expansion::new(source, limits, cancel);

    match mode {
        RollupMode::Direct => {
            expansion.check_cancelled()?;
            match expansion.recipe(&key)? {
                Some(recipe) => {
                    for ingredient in &recipe.ingredients {
                        let amount = ingredient.quantity.saturating_mul(quantity);
                        expansion.accumulate(&source.resolve(&ingredient.item), amount);
                    }
                }
                None => expansion.accumulate(&key, quantity),
            }
        }
        RollupMode::Deep => expansion.expand(&key, quantity, 0)?,
    }

    debug!(
        item = %key,
        quantity,
        mode = %mode,
        materials = expansion.materials.len(),
        lookups = expansion.lookups,
        "rollup complete"
    );

    Ok(Rollup {
        item: key,
        quantity,
        mode,
        materials: expansion.materials,
        events: expansion.events,
        recipe_lookups: expansion.lookups,
    })
}

/// Sum two material maps, keeping `left`'s order and appending keys only `right` has.
pub fn sum_materials(left: &IndexMap<String, u64>, right: &IndexMap<String, u64>) -> IndexMap<String, u64> {
    let mut total = left.clone();
    for (key, amount) in right {
        let entry = total.entry(key.clone()).or_insert(0);
        *entry = entry.saturating_add(*amount);
    }
    total
}

struct Expansion<'a, S: ?Sized> {
    source: &'a S,
    limits: RollupLimits,
    cancel: &'a CancelToken,
    cache: HashMap<String, Option<Rc<Recipe>>>,
    stack: Vec<String>,
    observed: HashSet<String>,
    materials: IndexMap<String, u64>,
    events: Vec<LimitEvent>,
    lookups: usize,
}

impl<'a, S: RecipeSource + ?Sized> Expansion<'a, S> {
    fn new(source: &'a S, limits: &RollupLimits, cancel: &'a CancelToken) -> Self {
        Self {
            source,
            limits: *limits,
            cancel,
            cache: HashMap::new(),
            stack: Vec::new(),
            observed: HashSet::new(),
            materials: IndexMap::new(),
            events: Vec::new(),
            lookups: 0,
        }
    }

    fn check_cancelled(&self) -> CoreResult<()> {
        if self.cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        Ok(())
    }

    /// Memoized fetch; one store lookup per distinct key per rollup.
    fn recipe(&mut self, key: &str) -> CoreResult<Option<Rc<Recipe>>> {
        if let Some(cached) = self.cache.get(key) {
            return Ok(cached.clone());
        }
        self.lookups += 1;
        let recipe = fetch_recipe(self.source, key)?.map(Rc::new);
        self.cache.insert(key.to_string(), recipe.clone());
        Ok(recipe)
    }

    fn accumulate(&mut self, key: &str, amount: u64) {
        let entry = self.materials.entry(key.to_string()).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    fn cut(&mut self, kind: LimitKind, key: &str, amount: u64, depth: usize, members: Vec<String>) {
        warn!(kind = ?kind, key, depth, ?members, "rollup expansion cut; treating node as base material");
        self.events.push(LimitEvent {
            kind,
            key: key.to_string(),
            depth,
            members,
        });
        self.accumulate(key, amount);
    }

    fn expand(&mut self, key: &str, amount: u64, depth: usize) -> CoreResult<()> {
        self.check_cancelled()?;

        if let Some(position) = self.stack.iter().position(|open| open == key) {
            // Keys above the re-entered one on the stack formed the loop. They are reported on the
            // event only; materials never carry a zero amount.
            let members = self.stack[position + 1..].to_vec();
            self.cut(LimitKind::Cycle, key, amount, depth, members);
            return Ok(());
        }

        self.observed.insert(key.to_string());

        let Some(recipe) = self.recipe(key)? else {
            self.accumulate(key, amount);
            return Ok(());
        };

        if depth >= self.limits.max_depth {
            self.cut(LimitKind::Depth, key, amount, depth, Vec::new());
            return Ok(());
        }
        if self.observed.len() > self.limits.max_unique_materials {
            self.cut(LimitKind::UniqueMaterials, key, amount, depth, Vec::new());
            return Ok(());
        }

        self.stack.push(key.to_string());
        for ingredient in &recipe.ingredients {
            let resolved = self.source.resolve(&ingredient.item);
            self.expand(&resolved, ingredient.quantity.saturating_mul(amount), depth + 1)?;
        }
        self.stack.pop();
        Ok(())
    }
}
