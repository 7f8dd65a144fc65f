//! Property-based tests for pinc-provision
//!
//! These tests verify:
//! - kpartx output parsing never invents partitions
//! - System partition selection picks the highest number
//! - Defaults-file edits are idempotent

use proptest::prelude::*;

use pinc_provision::commands::mapping::{parse_kpartx_output, select_system_partition};
use pinc_provision::rootfs::{ensure_line, set_assignment};

// =============================================================================
// kpartx Output Property Tests
// =============================================================================

fn kpartx_line(loop_dev: u32, partition: u32) -> String {
    format!(
        "add map loop{}p{} (253:{}): 0 524288 linear 7:{} 8192",
        loop_dev, partition, partition, loop_dev
    )
}

proptest! {
    /// Every `add map` line yields exactly one partition with its number
    #[test]
    fn kpartx_every_line_parsed(
        loop_dev in 0u32..16,
        numbers in prop::collection::btree_set(1u32..64, 1..8),
    ) {
        let output: String = numbers
            .iter()
            .map(|n| kpartx_line(loop_dev, *n) + "\n")
            .collect();
        let parts = parse_kpartx_output(&output);

        prop_assert_eq!(parts.len(), numbers.len());
        for (part, number) in parts.iter().zip(numbers.iter()) {
            prop_assert_eq!(part.partition_number, *number);
            prop_assert_eq!(&part.name, &format!("loop{}p{}", loop_dev, number));
        }
    }

    /// The default choice is the highest-numbered partition
    #[test]
    fn kpartx_selects_highest(
        numbers in prop::collection::btree_set(1u32..64, 1..8),
    ) {
        let output: String = numbers.iter().map(|n| kpartx_line(0, *n) + "\n").collect();
        let parts = parse_kpartx_output(&output);
        let selected = select_system_partition(&parts, None).expect("should select");

        prop_assert_eq!(Some(&selected.partition_number), numbers.iter().max());
    }

    /// Lines that are not `add map` never produce partitions
    #[test]
    fn kpartx_noise_ignored(noise in "[a-z ]{0,40}") {
        prop_assume!(!noise.trim_start().starts_with("add map"));
        prop_assert!(parse_kpartx_output(&noise).is_empty());
    }
}

// =============================================================================
// Defaults-File Edit Property Tests
// =============================================================================

proptest! {
    /// Applying an assignment twice equals applying it once
    #[test]
    fn set_assignment_idempotent(
        value in "[a-z0-9 ]{0,16}",
        prefix in "(# comment\n)?(OTHER=1\n)?",
    ) {
        let once = set_assignment(&prefix, "INTERFACES", &value).expect("valid key");
        let twice = set_assignment(&once, "INTERFACES", &value).expect("valid key");
        prop_assert_eq!(&once, &twice);

        let expected = format!("INTERFACES=\"{}\"", value);
        prop_assert_eq!(once.lines().filter(|l| *l == expected).count(), 1);
    }

    /// ensure_line appends at most once whatever the starting content
    #[test]
    fn ensure_line_idempotent(lines in prop::collection::vec("[a-z.=#]{0,20}", 0..6)) {
        let content = lines.join("\n");
        let once = ensure_line(&content, "net.ipv4.ip_forward=1");
        let twice = ensure_line(&once, "net.ipv4.ip_forward=1");

        prop_assert_eq!(&once, &twice);
        prop_assert!(once.lines().any(|l| l == "net.ipv4.ip_forward=1"));
        prop_assert!(once.starts_with(&content));
    }
}
