use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use simcore::{cast, Event, EventHandler, Simulation, SimulationContext};

#[derive(Clone, Serialize)]
struct Tick {
    seq: u32,
}

#[derive(Clone, Serialize)]
struct Other {}

struct Recorder {
    received: Vec<(f64, u32)>,
    others: u32,
    ctx: SimulationContext,
}

impl EventHandler for Recorder {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            Tick { seq } => {
                self.received.push((self.ctx.time(), seq));
            }
            Other {} => {
                self.others += 1;
            }
        })
    }
}

fn setup() -> (Simulation, Rc<RefCell<Recorder>>, SimulationContext) {
    let mut sim = Simulation::new(123);
    let ctx = sim.create_context("recorder");
    let recorder = Rc::new(RefCell::new(Recorder {
        received: Vec::new(),
        others: 0,
        ctx,
    }));
    sim.add_handler("recorder", recorder.clone());
    let client = sim.create_context("client");
    (sim, recorder, client)
}

#[test]
// Events with equal time are delivered in emission order.
fn test_fifo_order_for_equal_times() {
    let (mut sim, recorder, client) = setup();
    let dst = sim.lookup_id("recorder").unwrap();

    client.emit(Tick { seq: 3 }, dst, 2.);
    client.emit(Tick { seq: 0 }, dst, 1.);
    client.emit(Tick { seq: 1 }, dst, 1.);
    client.emit(Tick { seq: 2 }, dst, 1.);

    sim.step_until_no_events();

    assert_eq!(
        recorder.borrow().received,
        vec![(1., 0), (1., 1), (1., 2), (2., 3)]
    );
    assert_eq!(sim.time(), 2.);
}

#[test]
fn test_cancel_by_predicate() {
    let (mut sim, recorder, client) = setup();
    let dst = sim.lookup_id("recorder").unwrap();

    client.emit(Tick { seq: 0 }, dst, 1.);
    client.emit(Other {}, dst, 1.);
    client.emit(Tick { seq: 1 }, dst, 2.);

    let canceled = client.cancel_events(|e| e.dst == dst && e.data.is::<Tick>());
    assert_eq!(canceled, 2);
    assert_eq!(client.pending_events(|e| e.dst == dst), 1);

    sim.step_until_no_events();

    assert!(recorder.borrow().received.is_empty());
    assert_eq!(recorder.borrow().others, 1);
}

#[test]
fn test_cancel_self_events() {
    let (mut sim, recorder, _client) = setup();
    let ctx = sim.create_context("recorder");

    ctx.emit_self(Tick { seq: 0 }, 5.);
    ctx.emit_self(Tick { seq: 1 }, 6.);
    assert_eq!(ctx.cancel_self_events::<Tick>(), 2);
    ctx.emit_self(Tick { seq: 2 }, 1.);

    sim.step_until_no_events();

    assert_eq!(recorder.borrow().received, vec![(1., 2)]);
}

#[test]
fn test_step_until_time() {
    let (mut sim, recorder, client) = setup();
    let dst = sim.lookup_id("recorder").unwrap();

    for seq in 0..5 {
        client.emit(Tick { seq }, dst, seq as f64 * 10.);
    }

    assert!(sim.step_until_time(25.));
    assert_eq!(recorder.borrow().received.len(), 3);
    assert!(sim.step_for_duration(10.));
    assert_eq!(recorder.borrow().received.len(), 4);
    assert!(!sim.step_until_time(100.));
    assert_eq!(recorder.borrow().received.len(), 5);
}

#[test]
fn test_same_seed_same_random_sequence() {
    let mut sim1 = Simulation::new(42);
    let mut sim2 = Simulation::new(42);
    for _ in 0..10 {
        assert_eq!(sim1.rand(), sim2.rand());
        assert_eq!(sim1.gen_range(0..100), sim2.gen_range(0..100));
    }
}
