//! # Root/Extended System Description Pointer

use crate::firmware::UefiFirmware;
use kernel_memory_addresses::PhysicalAddress;
use uefi::system;
use uefi::table::cfg::{ACPI_GUID, ACPI2_GUID};
use uefi_handoff::firmware::AcpiTables;

impl AcpiTables for UefiFirmware {
    fn rsdp(&self) -> Option<PhysicalAddress> {
        system::with_config_table(|table| {
            // Prefer ACPI 2.0 RSDP if available
            table
                .iter()
                .find(|entry| entry.guid == ACPI2_GUID)
                .or_else(|| table.iter().find(|entry| entry.guid == ACPI_GUID))
                .map(|entry| PhysicalAddress::from_ptr(entry.address))
        })
    }
}
