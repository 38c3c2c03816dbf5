//! Grid addressing

use super::LocationResolver;
use crate::config::GridConfig;
use crate::model::{ControlId, ControlLocation};

/// Resolves grid positions and legacy bank numbers on a fixed-size grid
#[derive(Debug, Clone)]
pub struct GridLocationResolver {
    grid: GridConfig,
}

impl GridLocationResolver {
    pub fn new(grid: GridConfig) -> Self {
        Self { grid }
    }

    pub fn contains(&self, location: &ControlLocation) -> bool {
        location.page >= 1
            && location.page <= self.grid.pages
            && location.row < self.grid.rows
            && location.column < self.grid.columns
    }

    /// Legacy banks are numbered from 1, row-major with `legacy_columns` per row
    pub fn legacy_bank_location(&self, page: u32, bank: u32) -> Option<ControlLocation> {
        if bank == 0 || self.grid.legacy_columns == 0 {
            return None;
        }
        let index = bank - 1;
        let location = ControlLocation::new(
            page,
            index / self.grid.legacy_columns,
            index % self.grid.legacy_columns,
        );
        self.contains(&location).then_some(location)
    }
}

impl LocationResolver for GridLocationResolver {
    fn get_control_id_at(&self, location: &ControlLocation) -> Option<ControlId> {
        self.contains(location)
            .then(|| ControlId::for_location(*location))
    }

    fn get_control_id_at_old_bank_index(&self, page: u32, bank: u32) -> Option<ControlId> {
        self.legacy_bank_location(page, bank)
            .map(ControlId::for_location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> GridLocationResolver {
        GridLocationResolver::new(GridConfig {
            pages: 10,
            rows: 4,
            columns: 8,
            legacy_columns: 8,
        })
    }

    #[test]
    fn test_location_bounds() {
        let grid = resolver();
        assert!(grid
            .get_control_id_at(&ControlLocation::new(1, 0, 0))
            .is_some());
        assert!(grid
            .get_control_id_at(&ControlLocation::new(0, 0, 0))
            .is_none());
        assert!(grid
            .get_control_id_at(&ControlLocation::new(1, 4, 0))
            .is_none());
        assert!(grid
            .get_control_id_at(&ControlLocation::new(11, 0, 0))
            .is_none());
    }

    #[test]
    fn test_legacy_bank_mapping() {
        let grid = resolver();
        assert_eq!(
            grid.get_control_id_at_old_bank_index(2, 1),
            Some(ControlId::for_location(ControlLocation::new(2, 0, 0)))
        );
        assert_eq!(
            grid.get_control_id_at_old_bank_index(2, 10),
            Some(ControlId::for_location(ControlLocation::new(2, 1, 1)))
        );
        assert_eq!(grid.get_control_id_at_old_bank_index(2, 0), None);
        assert_eq!(grid.get_control_id_at_old_bank_index(2, 33), None);
    }
}
