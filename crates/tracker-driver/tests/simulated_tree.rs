//! Full tree construction against a simulated card over TCP

mod common;

use bytes::Bytes;
use common::{closed_port, recv_timeout, DeviceDouble, LogBuffer, SimulatedCard};
use tracker_driver::{
    select_provider, DeviceTreeRoot, Direction, MemoryBinding, ModuleOptions, RegisterModule,
    RootConfig, SimEndpoint, StreamBinding, TrackerError, TransportMode,
};

fn config(card: &SimulatedCard, lanes: usize, vcs: usize, self_test: bool) -> RootConfig {
    RootConfig::simulated()
        .with_geometry(lanes, 4, vcs)
        .with_self_test(self_test)
        .with_sim(card.sim_endpoint())
}

#[test]
fn test_single_lane_scenario() {
    let card = SimulatedCard::start(1, 4);
    let root = DeviceTreeRoot::new(config(&card, 1, 4, false)).expect("tree");

    assert_eq!(
        root.memory().binding(),
        MemoryBinding::Tcp {
            host: "127.0.0.1".to_string(),
            port: card.memory_port
        }
    );

    let grid = root.grid();
    assert_eq!(grid.len(), 4);
    for vc in 0..4 {
        for dir in Direction::ALL {
            let ep = grid.endpoint(0, vc, dir).unwrap();
            let port = card.stream_base_port + u16::try_from(2 * vc).unwrap();
            let socket = match dir {
                Direction::Tx => port,
                Direction::Rx => port + 1,
            };
            assert_eq!(
                ep.binding(),
                StreamBinding::Tcp {
                    host: "127.0.0.1".to_string(),
                    port,
                    socket,
                }
            );
        }
    }

    assert_eq!(root.pcie_core().base(), Some(0x0000_0000));
    assert_eq!(root.protocol_core().base(), Some(0x0080_0000));
}

#[test]
fn test_pass_through_streams_loop_back() {
    let card = SimulatedCard::start(2, 2);
    let mut root = DeviceTreeRoot::new(config(&card, 2, 2, false)).expect("tree");

    let grid = root.grid_mut();
    grid.endpoint_mut(1, 1, Direction::Tx)
        .unwrap()
        .send(Bytes::from_static(b"lane 1 vc 1"))
        .unwrap();
    grid.endpoint_mut(0, 0, Direction::Tx)
        .unwrap()
        .send(Bytes::from_static(b"lane 0 vc 0"))
        .unwrap();

    let got = recv_timeout(grid.endpoint_mut(1, 1, Direction::Rx).unwrap());
    assert_eq!(got.as_deref(), Some(&b"lane 1 vc 1"[..]));
    let got = recv_timeout(grid.endpoint_mut(0, 0, Direction::Rx).unwrap());
    assert_eq!(got.as_deref(), Some(&b"lane 0 vc 0"[..]));
}

#[test]
fn test_self_test_scenario() {
    let card = SimulatedCard::start(1, 4);
    let plain = DeviceTreeRoot::new(config(&card, 1, 4, false)).expect("plain tree");
    let plain_bindings: Vec<_> = plain.grid().endpoints().map(|e| (e.id(), e.binding())).collect();
    drop(plain);

    let card = SimulatedCard::start(1, 4);
    let mut root = DeviceTreeRoot::new(config(&card, 1, 4, true)).expect("self-test tree");

    let bindings: Vec<_> = root
        .grid()
        .endpoints()
        .map(|e| (e.id(), e.binding()))
        .collect();
    let ids = |v: &[(tracker_driver::EndpointId, StreamBinding)]| v.iter().map(|(id, _)| *id).collect::<Vec<_>>();
    assert_eq!(ids(&bindings), ids(&plain_bindings));

    for tap in root.grid_mut().taps_mut() {
        for _ in 0..3 {
            tap.send_frame(128).unwrap();
        }
    }

    for vc in 0..4 {
        let tap = root.grid_mut().tap_mut(0, vc).unwrap().expect("tap");
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while tap.checker().stats().frames < 3 && std::time::Instant::now() < deadline {
            tap.poll().unwrap();
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let stats = tap.checker().stats();
        assert_eq!(stats.frames, 3, "{}", tap.checker().name());
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.bytes, tap.generator().stats().bytes);
    }

    assert!(matches!(
        root.grid_mut().endpoint_mut(0, 0, Direction::Tx),
        Err(TrackerError::StreamOwned { .. })
    ));
}

#[test]
fn test_register_access_through_modules() {
    let card = SimulatedCard::start(1, 1);
    card.set_register(0x2_0000, 0x0102_0304);
    card.set_register(0x0080_0000 + 0x3_0000, 0x11);

    let options = ModuleOptions {
        poll_enabled: false,
        init_read: true,
    };
    let root = DeviceTreeRoot::new(config(&card, 1, 1, false).with_options(options)).expect("tree");

    let version = root.pcie_core().last_read().expect("init read");
    assert_eq!(version.fpga_version, 0x0102_0304);
    assert_eq!(root.protocol_core().link_status(0, 3).unwrap(), 0x11);

    root.pcie_core().set_scratch_pad(0xCAFE).unwrap();
    assert_eq!(card.register(0x2_0004), 0xCAFE);
}

#[test]
fn test_unreachable_simulation_is_transport_unavailable() {
    let sim = SimEndpoint {
        host: "127.0.0.1".to_string(),
        memory_port: closed_port(),
        stream_base_port: 40_000,
    };
    let err = DeviceTreeRoot::new(RootConfig::simulated().with_sim(sim)).unwrap_err();
    assert!(matches!(err, TrackerError::TransportUnavailable { .. }), "{err}");
}

#[test]
fn test_missing_stream_ports_abort_construction() {
    // memory answers but only one lane of streams exists
    let card = SimulatedCard::start(1, 4);
    let err = DeviceTreeRoot::new(config(&card, 2, 4, false)).unwrap_err();
    assert!(matches!(err, TrackerError::TransportUnavailable { .. }), "{err}");
}

#[test]
fn test_invalid_geometry_checked_before_connecting() {
    let sim = SimEndpoint {
        host: "127.0.0.1".to_string(),
        memory_port: closed_port(),
        stream_base_port: 40_000,
    };
    let cfg = RootConfig::simulated().with_sim(sim).with_geometry(1, 4, 0);
    let err = DeviceTreeRoot::new(cfg).unwrap_err();
    assert!(matches!(err, TrackerError::InvalidGeometry { .. }), "{err}");
}

#[test]
fn test_hardware_and_simulated_grids_match() {
    for (lanes, vcs) in [(1, 4), (2, 3)] {
        let card = SimulatedCard::start(lanes, vcs);
        let sim_cfg = config(&card, lanes, vcs, false);
        assert_eq!(select_provider(&sim_cfg).mode(), TransportMode::Simulated);
        let sim = DeviceTreeRoot::new(sim_cfg).expect("simulated tree");

        let hw_cfg = RootConfig::hardware("/dev/datadev_0").with_geometry(lanes, 4, vcs);
        assert_eq!(select_provider(&hw_cfg).mode(), TransportMode::Hardware);
        let hw = DeviceTreeRoot::with_provider(hw_cfg, &DeviceDouble::new("/dev/datadev_0"))
            .expect("hardware tree");

        assert_eq!(sim.grid().len(), lanes * vcs);
        assert_eq!(hw.grid().len(), sim.grid().len());
        let ids = |r: &DeviceTreeRoot| r.grid().endpoints().map(|e| e.id()).collect::<Vec<_>>();
        assert_eq!(ids(&hw), ids(&sim));
        assert_eq!(hw.address_map(), sim.address_map());

        for lane in 0..lanes {
            for vc in 0..vcs {
                for dir in Direction::ALL {
                    let h = hw.grid().endpoint(lane, vc, dir).unwrap();
                    let s = sim.grid().endpoint(lane, vc, dir).unwrap();
                    assert_eq!(h.id(), s.id());
                    assert!(matches!(h.binding(), StreamBinding::Dma { .. }));
                    assert!(matches!(s.binding(), StreamBinding::Tcp { .. }));
                }
            }
            assert!(hw.grid().endpoint(lane, vcs, Direction::Rx).is_err());
            assert!(sim.grid().endpoint(lane, vcs, Direction::Rx).is_err());
        }
    }
}

#[test]
fn test_teardown_logs_stream_sockets() {
    let card = SimulatedCard::start(1, 1);
    let log = LogBuffer::default();
    log.capture(|| {
        let root = DeviceTreeRoot::new(config(&card, 1, 1, false)).expect("tree");
        drop(root);
    });

    let text = log.contents();
    let (tx, rx) = (card.stream_base_port, card.stream_base_port + 1);
    assert!(text.contains(&format!("Closing [0][0] TX on 127.0.0.1:{tx}")), "{text}");
    assert!(text.contains(&format!("Closing [0][0] RX on 127.0.0.1:{rx}")), "{text}");
    let tx_at = text.find("[0][0] TX on").unwrap();
    let rx_at = text.find("[0][0] RX on").unwrap();
    assert!(tx_at < rx_at, "TX must close before RX");
}
