use std::collections::BTreeSet;

use proptest::prelude::*;

use vm_pager::fs::MemFileSystem;
use vm_pager::noff::ImageBuilder;
use vm_pager::{
    Access, Kernel, Location, NUM_PHYS_PAGES, PAGE_SIZE, PageRef, PolicyKind, RunOutcome,
    SimMachine, SpaceId, USER_STACK_SIZE, VmConfig, VmError,
};

fn kernel(frames: usize, policy: PolicyKind, fs: MemFileSystem) -> Kernel<SimMachine> {
    let config = VmConfig {
        num_phys_pages: frames,
        user_stack_size: 0,
        policy,
    };
    Kernel::new(config, SimMachine::new(frames), Box::new(fs)).unwrap()
}

/// An image of `n` pages, each page filled with its own index
fn image(n: usize) -> Vec<u8> {
    let code: Vec<u8> = (0..n * PAGE_SIZE).map(|i| (i / PAGE_SIZE) as u8).collect();
    ImageBuilder::new().code(code).build()
}

fn va(vpn: usize) -> u32 {
    (vpn * PAGE_SIZE) as u32
}

fn location(kernel: &Kernel<SimMachine>, id: SpaceId, vpn: usize) -> Location {
    kernel.space(id).unwrap().entry(vpn).unwrap().location
}

/// Every claimed frame backs exactly one resident page somewhere
fn assert_frames_consistent(kernel: &Kernel<SimMachine>) {
    let mut resident = Vec::new();
    for space in kernel.spaces() {
        resident.extend(space.resident_frames());
    }
    let unique: BTreeSet<_> = resident.iter().copied().collect();
    assert_eq!(unique.len(), resident.len(), "frame mapped twice: {:?}", resident);

    let claimed: BTreeSet<_> = kernel.frames().claimed().collect();
    assert_eq!(claimed, unique);
}

// ============================================================================
// Load followed by the first fault
// ============================================================================

#[test]
fn test_two_pages_past_physical_memory() {
    let stack_pages = USER_STACK_SIZE / PAGE_SIZE;
    let code = vec![0u8; (NUM_PHYS_PAGES + 2 - stack_pages) * PAGE_SIZE];
    let fs = MemFileSystem::new().with("halfway", ImageBuilder::new().code(code).build());
    let config = VmConfig::default();
    let mut kernel = Kernel::new(config, SimMachine::default(), Box::new(fs)).unwrap();

    let id = kernel.spawn("halfway").unwrap();
    let space = kernel.space(id).unwrap();

    assert_eq!(space.num_pages(), NUM_PHYS_PAGES + 2);
    for vpn in 0..NUM_PHYS_PAGES {
        assert_eq!(location(&kernel, id, vpn), Location::Resident(vpn));
    }
    assert_eq!(location(&kernel, id, NUM_PHYS_PAGES), Location::Swapped(0));
    assert_eq!(location(&kernel, id, NUM_PHYS_PAGES + 1), Location::Swapped(1));
    let loaded = kernel.stats();
    assert_eq!(loaded.page_faults, 0);
    assert_eq!(loaded.disk_reads, 0);
    assert_eq!(loaded.disk_writes, 2);

    kernel.init_registers(id).unwrap();
    kernel.switch_to(id).unwrap();
    kernel
        .machine_mut()
        .push_trace([Access::Read(va(NUM_PHYS_PAGES))]);
    assert_eq!(kernel.run().unwrap(), RunOutcome::TraceEnd);

    assert_eq!(location(&kernel, id, 0), Location::Swapped(0));
    assert_eq!(location(&kernel, id, NUM_PHYS_PAGES), Location::Resident(0));
    let stats = kernel.stats();
    assert_eq!(stats.page_faults, 1);
    assert_eq!(stats.disk_reads, 1);
    assert_eq!(stats.disk_writes - loaded.disk_writes, 1);
    assert_frames_consistent(&kernel);
}

#[test]
fn test_padding_and_stack_round_up() {
    let fs = MemFileSystem::new().with(
        "odd",
        ImageBuilder::new()
            .code(vec![1u8; 10])
            .init_data(vec![2u8; 20])
            .uninit_data(30)
            .build(),
    );
    let config = VmConfig {
        num_phys_pages: 16,
        user_stack_size: 200,
        policy: PolicyKind::Fifo,
    };
    let mut kernel = Kernel::new(config, SimMachine::new(16), Box::new(fs)).unwrap();

    let id = kernel.spawn("odd").unwrap();

    // 10 + 20 + 30 + 200 bytes
    assert_eq!(kernel.space(id).unwrap().num_pages(), 260usize.div_ceil(PAGE_SIZE));
}

// ============================================================================
// Eviction
// ============================================================================

#[test]
fn test_written_byte_survives_eviction() {
    let fs = MemFileSystem::new().with("prog", image(4));
    let mut kernel = kernel(2, PolicyKind::Fifo, fs);
    kernel.machine_mut().push_trace([
        Access::Write(va(0) + 5, 0xab),
        Access::Read(va(2)),
        Access::Read(va(0) + 5),
    ]);

    kernel.execute("prog").unwrap();

    let refs = kernel.machine().references();
    assert_eq!(refs.len(), 3);
    // Page 0 came back into the frame page 1 gave up
    assert_eq!(refs[2].value, 0xab);
    assert_eq!(refs[2].pa, PAGE_SIZE + 5);
    assert_eq!(location(&kernel, SpaceId(0), 1), Location::Swapped(0));
    assert_eq!(kernel.stats().page_faults, 2);
}

#[test]
fn test_fifo_evicts_in_load_order() {
    let fs = MemFileSystem::new().with("prog", image(6));
    let mut kernel = kernel(3, PolicyKind::Fifo, fs);
    let id = kernel.spawn("prog").unwrap();
    kernel.init_registers(id).unwrap();
    kernel.switch_to(id).unwrap();

    let mut evicted = Vec::new();
    for incoming in 3..6 {
        let before: Vec<_> = (0..3)
            .filter(|&vpn| location(&kernel, id, vpn).is_resident())
            .collect();
        kernel.machine_mut().push_trace([Access::Read(va(incoming))]);
        kernel.run().unwrap();
        let gone: Vec<_> = before
            .into_iter()
            .filter(|&vpn| !location(&kernel, id, vpn).is_resident())
            .collect();
        evicted.extend(gone);
    }

    assert_eq!(evicted, vec![0, 1, 2]);
    // Each victim lands in the slot its replacement came from
    assert_eq!(location(&kernel, id, 0), Location::Swapped(0));
    assert_eq!(location(&kernel, id, 1), Location::Swapped(1));
    assert_eq!(location(&kernel, id, 2), Location::Swapped(2));
}

#[test]
fn test_fifo_ignores_recent_use() {
    let fs = MemFileSystem::new().with("prog", image(3));
    let mut kernel = kernel(2, PolicyKind::Fifo, fs);
    kernel
        .machine_mut()
        .push_trace([Access::Read(va(0)), Access::Read(va(0)), Access::Read(va(2))]);

    kernel.execute("prog").unwrap();

    assert_eq!(location(&kernel, SpaceId(0), 0), Location::Swapped(0));
    assert_eq!(location(&kernel, SpaceId(0), 1), Location::Resident(1));
}

#[test]
fn test_lru_evicts_least_recently_used() {
    let fs = MemFileSystem::new().with("prog", image(5));
    let mut kernel = kernel(3, PolicyKind::Lru, fs);
    kernel.machine_mut().push_trace([
        Access::Read(va(1)),
        Access::Read(va(0)),
        // page 2 is now the oldest reference
        Access::Read(va(3)),
        // then page 1
        Access::Read(va(4)),
    ]);

    kernel.execute("prog").unwrap();

    let id = SpaceId(0);
    assert_eq!(location(&kernel, id, 2), Location::Swapped(0));
    assert_eq!(location(&kernel, id, 1), Location::Swapped(1));
    assert!(location(&kernel, id, 0).is_resident());
    assert_eq!(
        kernel.policy().tracked(),
        vec![PageRef::new(id, 0), PageRef::new(id, 3), PageRef::new(id, 4)]
    );
}

// ============================================================================
// Process lifecycle
// ============================================================================

#[test]
fn test_destroy_leaves_other_spaces_alone() {
    let fs = MemFileSystem::new()
        .with("a", image(2))
        .with("b", image(3))
        .with("c", image(1));
    let mut kernel = kernel(8, PolicyKind::Fifo, fs);
    let a = kernel.spawn("a").unwrap();
    let b = kernel.spawn("b").unwrap();
    let c = kernel.spawn("c").unwrap();

    let released = kernel.destroy(b).unwrap();

    assert_eq!(released, vec![2, 3, 4]);
    assert_eq!(kernel.frames().claimed().collect::<Vec<_>>(), vec![0, 1, 5]);
    assert_eq!(kernel.space(a).unwrap().resident_frames(), vec![0, 1]);
    assert_eq!(kernel.space(c).unwrap().resident_frames(), vec![5]);

    // The freed frames are handed out again lowest first
    let d = kernel.spawn("a").unwrap();
    assert_eq!(kernel.space(d).unwrap().resident_frames(), vec![2, 3]);
    assert_frames_consistent(&kernel);
}

#[test]
fn test_destroy_after_faults_releases_current_frames() {
    let fs = MemFileSystem::new().with("prog", image(4));
    let mut kernel = kernel(2, PolicyKind::Fifo, fs);
    kernel
        .machine_mut()
        .push_trace([Access::Read(va(3)), Access::Syscall { code: 1, arg: 5 }]);

    let outcome = kernel.execute("prog").unwrap();

    assert_eq!(outcome, RunOutcome::Exited(5));
    assert_eq!(kernel.frames().free_count(), 2);
    assert!(kernel.policy().is_empty());
}

#[test]
fn test_victim_taken_from_sleeping_process() {
    let fs = MemFileSystem::new()
        .with("sleeper", image(1))
        .with("runner", image(2));
    let mut kernel = kernel(2, PolicyKind::Fifo, fs);
    let sleeper = kernel.spawn("sleeper").unwrap();
    kernel.machine_mut().push_trace([Access::Read(va(1) + 3)]);

    kernel.execute("runner").unwrap();

    let runner = SpaceId(1);
    assert_eq!(location(&kernel, sleeper, 0), Location::Swapped(0));
    assert_eq!(location(&kernel, runner, 1), Location::Resident(0));
    assert_eq!(kernel.machine().references()[0].value, 1);

    // Switching back makes the sleeper fault its page in again
    kernel.switch_to(sleeper).unwrap();
    kernel.machine_mut().push_trace([Access::Read(va(0))]);
    kernel.run().unwrap();
    assert_eq!(location(&kernel, sleeper, 0), Location::Resident(1));
    assert_eq!(location(&kernel, runner, 0), Location::Swapped(0));
    assert_frames_consistent(&kernel);
}

#[test]
fn test_bad_images_are_rejected_cleanly() {
    let mut garbage = image(1);
    garbage[0] ^= 0xff;
    let fs = MemFileSystem::new().with("garbage", garbage);
    let mut kernel = kernel(2, PolicyKind::Fifo, fs);

    assert!(matches!(
        kernel.spawn("garbage"),
        Err(VmError::MalformedImage(_))
    ));
    assert!(matches!(
        kernel.spawn("absent"),
        Err(VmError::ImageNotFound(_))
    ));
    assert_eq!(kernel.frames().free_count(), 2);
    assert!(kernel.swap().is_empty());
    assert_eq!(kernel.spaces().count(), 0);
}

#[test]
fn test_big_endian_image_runs() {
    let code: Vec<u8> = (0..2 * PAGE_SIZE).map(|i| (i / PAGE_SIZE) as u8 + 40).collect();
    let fs = MemFileSystem::new().with("be", ImageBuilder::new().code(code).big_endian().build());
    let mut kernel = kernel(1, PolicyKind::Fifo, fs);
    kernel.machine_mut().push_trace([Access::Read(va(1))]);

    kernel.execute("be").unwrap();

    assert_eq!(kernel.machine().references()[0].value, 41);
}

// ============================================================================
// Invariants under arbitrary reference streams
// ============================================================================

fn policy() -> impl Strategy<Value = PolicyKind> {
    prop_oneof![Just(PolicyKind::Fifo), Just(PolicyKind::Lru)]
}

proptest! {
    #[test]
    fn prop_frames_owned_exactly_once(
        frames in 1usize..6,
        bystander_pages in 0usize..4,
        pages in 1usize..10,
        policy in policy(),
        vpns in prop::collection::vec(0usize..10, 0..40),
    ) {
        let fs = MemFileSystem::new()
            .with("bystander", image(bystander_pages))
            .with("prog", image(pages));
        let mut kernel = kernel(frames, policy, fs);
        if bystander_pages > 0 {
            kernel.spawn("bystander").unwrap();
        }
        let trace = vpns.iter().filter(|&&vpn| vpn < pages).map(|&vpn| Access::Read(va(vpn) + 1));
        kernel.machine_mut().push_trace(trace);

        kernel.execute("prog").unwrap();

        assert_frames_consistent(&kernel);
        // Every read returns the byte the loader put on that page
        for reference in kernel.machine().references() {
            prop_assert_eq!(reference.value as usize, reference.va as usize / PAGE_SIZE);
        }
        let stats = kernel.stats();
        prop_assert_eq!(stats.page_faults, stats.disk_reads);
    }

    #[test]
    fn prop_fifo_evicts_in_residency_order(
        resident in 1usize..6,
        extra in 1usize..6,
    ) {
        let pages = resident + extra;
        let fs = MemFileSystem::new().with("prog", image(pages));
        let mut kernel = kernel(resident, PolicyKind::Fifo, fs);
        let id = kernel.spawn("prog").unwrap();
        kernel.init_registers(id).unwrap();
        kernel.switch_to(id).unwrap();

        for (n, incoming) in (resident..pages).enumerate() {
            kernel.machine_mut().push_trace([Access::Read(va(incoming))]);
            kernel.run().unwrap();
            // Pages become resident in vpn order, so fault n evicts page n
            prop_assert!(!location(&kernel, id, n).is_resident());
        }
        prop_assert_eq!(kernel.stats().page_faults as usize, extra);
    }
}
