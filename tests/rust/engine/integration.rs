use absint_domains::factory::IntervalFactory;
use absint_domains::interval::IntervalValue;
use absint_engine::assembler::Assembler;
use absint_engine::bytecode::{ConstantPool, DecodeError, MethodBody, Opcode};
use absint_engine::descriptor::MethodDescriptor;
use absint_engine::interpreter::{
    analyze, AnalysisError, EngineError, Interpreter, InterpreterConfig, PathEnd,
};
use absint_engine::limits::{ExplorationLimits, LimitError};
use absint_engine::minimal_world::MinimalWorld;
use absint_engine::trace::ExplorationTrace;
use absint_engine::value::ValueKind;
use absint_engine::world::BaselineWorld;

type IntervalWorld = MinimalWorld<IntervalFactory>;

fn world_with_local(index: u16, value: IntervalValue) -> IntervalWorld {
    MinimalWorld::new(IntervalFactory::new().with_local(index, value))
}

fn returned(world: &IntervalWorld) -> IntervalValue {
    world.return_value().cloned().expect("a returned value")
}

/// `iload_0; ifeq ZERO; bipush 20; ireturn; ZERO: bipush 10; ireturn`
fn zero_test_method() -> MethodBody {
    let mut asm = Assembler::new();
    let zero = asm.label();
    asm.op(Opcode::Iload0)
        .branch(Opcode::Ifeq, zero)
        .int(20)
        .op(Opcode::Ireturn)
        .bind(zero)
        .int(10)
        .op(Opcode::Ireturn);
    asm.finish().expect("assembles")
}

#[test]
fn straight_line_addition_yields_one_exact_result() {
    let mut asm = Assembler::new();
    asm.op(Opcode::Iconst2)
        .op(Opcode::Iconst3)
        .op(Opcode::Iadd)
        .op(Opcode::Ireturn);
    let body = asm.finish().expect("assembles");

    let exploration = Interpreter::new(&body)
        .interpret(MinimalWorld::new(IntervalFactory::new()))
        .expect("explores");
    assert_eq!(exploration.terminal_states, 1);
    let world = exploration.world.expect("joined world");
    assert_eq!(returned(&world), IntervalValue::int(5));
    assert_eq!(exploration.trace.coverage, vec![0, 1, 2, 3]);
}

#[test]
fn exact_zero_takes_only_the_then_path() {
    let mut asm = Assembler::new();
    let zero = asm.label();
    asm.op(Opcode::Iconst0)
        .branch(Opcode::Ifeq, zero)
        .op(Opcode::Iconst1)
        .op(Opcode::Ireturn)
        .bind(zero)
        .op(Opcode::Iconst2)
        .op(Opcode::Ireturn);
    let body = asm.finish().expect("assembles");

    let exploration = Interpreter::new(&body)
        .interpret(MinimalWorld::new(IntervalFactory::new()))
        .expect("explores");
    assert_eq!(exploration.terminal_states, 1);
    assert_eq!(exploration.trace.coverage, vec![0, 1, 6, 7]);
    assert_eq!(exploration.trace.metrics.forks.forks, 0);
    assert_eq!(returned(&exploration.world.expect("world")), IntervalValue::int(2));
}

#[test]
fn undetermined_test_forks_and_joins_both_outcomes() {
    let body = zero_test_method();
    let exploration = Interpreter::new(&body)
        .interpret(world_with_local(0, IntervalValue::int_range(-1, 1)))
        .expect("explores");
    assert_eq!(exploration.terminal_states, 2);
    assert_eq!(exploration.trace.metrics.forks.forks, 1);
    let world = exploration.world.expect("joined world");
    assert_eq!(returned(&world), IntervalValue::int_range(10, 20));
}

#[test]
fn exhaustive_world_forks_even_on_a_decided_test() {
    let body = zero_test_method();
    let world = world_with_local(0, IntervalValue::int(0)).exhaustive();
    let exploration = Interpreter::new(&body).interpret(world).expect("explores");
    assert_eq!(exploration.terminal_states, 2);
}

#[test]
fn switch_explores_only_the_candidate_case() {
    let mut asm = Assembler::new();
    let cases = [asm.label(), asm.label(), asm.label()];
    let default = asm.label();
    asm.op(Opcode::Iload0).tableswitch(0, default, &cases);
    for (label, value) in cases.iter().zip([100, 101, 102]) {
        asm.bind(*label).int(value).op(Opcode::Ireturn);
    }
    asm.bind(default).int(-1).op(Opcode::Ireturn);
    let body = asm.finish().expect("assembles");

    let exploration = Interpreter::new(&body)
        .interpret(world_with_local(0, IntervalValue::int(1)))
        .expect("explores");
    assert_eq!(exploration.terminal_states, 1);
    assert_eq!(exploration.trace.metrics.switch_cases, 1);
    assert_eq!(
        returned(&exploration.world.expect("world")),
        IntervalValue::int(101)
    );
}

#[test]
fn selector_outside_every_case_takes_the_default() {
    let mut asm = Assembler::new();
    let (one, two, other) = (asm.label(), asm.label(), asm.label());
    asm.op(Opcode::Iload0)
        .lookupswitch(other, &[(1, one), (2, two)]);
    asm.bind(one).int(1).op(Opcode::Ireturn);
    asm.bind(two).int(2).op(Opcode::Ireturn);
    asm.bind(other).int(0).op(Opcode::Ireturn);
    let body = asm.finish().expect("assembles");

    let exploration = Interpreter::new(&body)
        .interpret(world_with_local(0, IntervalValue::int_range(6, 7)))
        .expect("explores");
    assert_eq!(exploration.terminal_states, 1);
    assert_eq!(exploration.trace.metrics.switch_cases, 1);
    assert_eq!(
        returned(&exploration.world.expect("world")),
        IntervalValue::int(0)
    );
}

#[test]
fn required_switch_explores_each_distinct_target_once() {
    let mut asm = Assembler::new();
    let (shared, single, other) = (asm.label(), asm.label(), asm.label());
    asm.op(Opcode::Iload0)
        .tableswitch(0, other, &[shared, shared, single]);
    asm.bind(shared).int(7).op(Opcode::Ireturn);
    asm.bind(single).int(8).op(Opcode::Ireturn);
    asm.bind(other).int(9).op(Opcode::Ireturn);
    let body = asm.finish().expect("assembles");

    let exploration = Interpreter::new(&body)
        .interpret(world_with_local(0, IntervalValue::top(ValueKind::Int)).exhaustive())
        .expect("explores");
    assert_eq!(exploration.terminal_states, 3);
    assert_eq!(exploration.trace.metrics.switch_cases, 3);
    assert_eq!(
        returned(&exploration.world.expect("world")),
        IntervalValue::int_range(7, 9)
    );
}

/// `i = 0; do { i++; } while (i < 3); return i;`
fn counted_loop_method() -> MethodBody {
    let mut asm = Assembler::new();
    let body_start = asm.label();
    asm.op(Opcode::Iconst0)
        .op(Opcode::Istore1)
        .bind(body_start)
        .iinc(1, 1)
        .op(Opcode::Iload1)
        .op(Opcode::Iconst3)
        .branch(Opcode::IfIcmplt, body_start)
        .op(Opcode::Iload1)
        .op(Opcode::Ireturn);
    asm.finish().expect("assembles")
}

#[test]
fn counted_loop_follows_its_back_edge_until_the_exit() {
    let body = counted_loop_method();
    let exploration = Interpreter::new(&body)
        .interpret(MinimalWorld::new(IntervalFactory::new()))
        .expect("explores");
    assert_eq!(exploration.trace.metrics.back_edges, 2);
    assert_eq!(
        returned(&exploration.world.expect("world")),
        IntervalValue::int(3)
    );
}

#[test]
fn exhaustive_world_still_follows_a_back_edge_whose_exit_is_infeasible() {
    let body = counted_loop_method();
    let exploration = Interpreter::new(&body)
        .interpret(MinimalWorld::new(IntervalFactory::new()).exhaustive())
        .expect("explores");
    assert_eq!(exploration.terminal_states, 1);
    assert_eq!(exploration.trace.metrics.back_edges, 2);
    assert_eq!(
        returned(&exploration.world.expect("world")),
        IntervalValue::int(3)
    );
}

#[test]
fn undecided_back_edge_falls_through_without_looping() {
    let mut asm = Assembler::new();
    let top = asm.label();
    asm.bind(top)
        .op(Opcode::Iload0)
        .branch(Opcode::Ifne, top)
        .op(Opcode::Iload0)
        .op(Opcode::Ireturn);
    let body = asm.finish().expect("assembles");

    let exploration = Interpreter::new(&body)
        .interpret(world_with_local(0, IntervalValue::top(ValueKind::Int)))
        .expect("explores");
    assert_eq!(exploration.terminal_states, 1);
    assert_eq!(exploration.trace.metrics.back_edges, 0);
    assert_eq!(exploration.trace.metrics.forks.forks, 0);
}

#[test]
fn subroutine_returns_after_its_jsr() {
    let mut asm = Assembler::new();
    let subroutine = asm.label();
    asm.op(Opcode::Iconst5)
        .op(Opcode::Istore1)
        .branch(Opcode::Jsr, subroutine)
        .op(Opcode::Iload1)
        .op(Opcode::Ireturn)
        .bind(subroutine)
        .op(Opcode::Astore2)
        .iinc(1, 1)
        .local(Opcode::Ret, 2);
    let body = asm.finish().expect("assembles");

    let world = analyze(
        &body,
        MinimalWorld::new(IntervalFactory::new()),
        InterpreterConfig::default(),
    )
    .expect("analyzes");
    assert_eq!(returned(&world), IntervalValue::int(6));
    assert_eq!(world.local(2), Some(&IntervalValue::return_address(5)));
}

#[test]
fn ret_without_a_pending_jsr_is_fatal() {
    let mut asm = Assembler::new();
    asm.local(Opcode::Ret, 0);
    let body = asm.finish().expect("assembles");
    let result = Interpreter::new(&body).interpret(BaselineWorld);
    assert!(matches!(result, Err(EngineError::RetWithoutJsr { offset: 0 })));
}

#[test]
fn unsupported_instruction_abandons_only_its_path() {
    let mut asm = Assembler::new();
    let done = asm.label();
    asm.op(Opcode::Iload0)
        .branch(Opcode::Ifeq, done)
        .op(Opcode::Invokedynamic)
        .raw(0)
        .raw(1)
        .raw(0)
        .raw(0)
        .bind(done)
        .op(Opcode::Return);
    let body = asm.finish().expect("assembles");

    let exploration = Interpreter::new(&body)
        .interpret(world_with_local(0, IntervalValue::top(ValueKind::Int)))
        .expect("unsupported is not fatal");
    assert_eq!(exploration.terminal_states, 1);
    assert_eq!(exploration.unsupported.len(), 1);
    assert_eq!(exploration.unsupported[0].offset, 4);
    assert_eq!(exploration.unsupported[0].mnemonic, "invokedynamic");
    assert_eq!(exploration.trace.metrics.unsupported_paths, 1);

    let analysis = analyze(
        &body,
        world_with_local(0, IntervalValue::top(ValueKind::Int)),
        InterpreterConfig::default(),
    );
    assert!(matches!(analysis, Err(AnalysisError::Unsupported(ref i)) if i.offset == 4));
}

#[test]
fn unknown_opcode_byte_is_reported_as_unsupported() {
    let body = MethodBody::new(vec![0xe0], ConstantPool::new());
    let exploration = Interpreter::new(&body)
        .interpret(BaselineWorld)
        .expect("explores");
    assert_eq!(exploration.unsupported[0].byte, 0xe0);
    assert!(exploration.world.is_none());
}

#[test]
fn running_off_the_end_leaves_no_terminal_state() {
    let mut asm = Assembler::new();
    asm.op(Opcode::Iconst1).op(Opcode::Pop);
    let body = asm.finish().expect("assembles");

    let exploration = Interpreter::new(&body)
        .interpret(MinimalWorld::new(IntervalFactory::new()))
        .expect("explores");
    assert_eq!(exploration.trace.metrics.dead_paths, 1);
    assert!(exploration.world.is_none());

    let analysis = analyze(
        &body,
        MinimalWorld::new(IntervalFactory::new()),
        InterpreterConfig::default(),
    );
    assert!(matches!(analysis, Err(AnalysisError::NoTerminalState)));
}

#[test]
fn stack_underflow_is_fatal() {
    let mut asm = Assembler::new();
    asm.op(Opcode::Iadd).op(Opcode::Ireturn);
    let body = asm.finish().expect("assembles");
    let error = Interpreter::new(&body)
        .interpret(MinimalWorld::new(IntervalFactory::new()))
        .expect_err("iadd on an empty stack");
    assert!(error.is_stack_error());
    assert!(!error.is_value_error());
}

#[test]
fn jump_outside_the_code_is_a_decode_error() {
    let body = MethodBody::new(vec![Opcode::Goto.byte(), 0x00, 0x10], ConstantPool::new());
    let result = Interpreter::new(&body).interpret(BaselineWorld);
    assert!(matches!(
        result,
        Err(EngineError::Decode(DecodeError::BranchTarget {
            offset: 0,
            target: 16
        }))
    ));
}

/// Two nested undecided tests: four paths, forks at depth one and two.
fn nested_forks_method() -> MethodBody {
    let mut asm = Assembler::new();
    let (outer, inner_then, inner_else) = (asm.label(), asm.label(), asm.label());
    asm.op(Opcode::Iload0)
        .branch(Opcode::Ifeq, outer)
        .op(Opcode::Iload0)
        .branch(Opcode::Ifgt, inner_else)
        .op(Opcode::Return)
        .bind(inner_else)
        .op(Opcode::Return)
        .bind(outer)
        .op(Opcode::Iload1)
        .branch(Opcode::Ifeq, inner_then)
        .op(Opcode::Return)
        .bind(inner_then)
        .op(Opcode::Return);
    asm.finish().expect("assembles")
}

#[test]
fn fork_metrics_track_nesting() {
    let body = nested_forks_method();
    let world = MinimalWorld::new(IntervalFactory::new());
    let exploration = Interpreter::new(&body).interpret(world).expect("explores");
    assert_eq!(exploration.terminal_states, 4);
    assert_eq!(exploration.trace.metrics.forks.forks, 3);
    assert_eq!(exploration.trace.metrics.forks.max_fork_depth, 2);
}

#[test]
fn fork_depth_limit_is_enforced() {
    let body = nested_forks_method();
    let config = InterpreterConfig {
        limits: ExplorationLimits {
            max_fork_depth: Some(1),
        },
        record_steps: false,
    };
    let result = Interpreter::with_config(&body, config)
        .interpret(MinimalWorld::new(IntervalFactory::new()));
    assert!(matches!(
        result,
        Err(EngineError::Limit(LimitError::ForkDepth { limit: 1 }))
    ));
}

#[test]
fn baseline_world_explores_every_path() {
    let body = nested_forks_method();
    let exploration = Interpreter::new(&body)
        .interpret(BaselineWorld)
        .expect("explores");
    assert_eq!(exploration.terminal_states, 4);
    assert_eq!(exploration.world, Some(BaselineWorld));
}

#[test]
fn exploration_can_start_mid_method() {
    let body = zero_test_method();
    let mut interpreter = Interpreter::new(&body);
    // offset 4 is the fall-through `bipush 20`
    let end = interpreter
        .interpret_from(MinimalWorld::new(IntervalFactory::new()), 4)
        .expect("explores");
    assert_eq!(end, PathEnd::Terminal);
    assert_eq!(interpreter.terminal_states().len(), 1);
    assert_eq!(returned(&interpreter.terminal_states()[0]), IntervalValue::int(20));
}

#[test]
fn method_entry_state_feeds_parameters() {
    // static long twice(long x) { return x + x; }
    let mut asm = Assembler::new();
    asm.op(Opcode::Lload0)
        .op(Opcode::Lload0)
        .op(Opcode::Ladd)
        .op(Opcode::Lreturn);
    let body = asm.finish().expect("assembles");
    let descriptor = MethodDescriptor::parse("(J)J").expect("descriptor");
    let factory = IntervalFactory::new().with_local(0, IntervalValue::long_range(1, 4));
    let world = MinimalWorld::for_method(factory, &descriptor, true);

    let result = analyze(&body, world, InterpreterConfig::default()).expect("analyzes");
    assert_eq!(returned(&result), IntervalValue::long_range(2, 8));
}

#[test]
fn trace_and_config_round_trip_through_json() {
    let config = InterpreterConfig {
        limits: ExplorationLimits {
            max_fork_depth: Some(8),
        },
        record_steps: true,
    };
    let encoded = serde_json::to_string(&config).expect("serializes");
    let decoded: InterpreterConfig = serde_json::from_str(&encoded).expect("deserializes");
    assert_eq!(decoded, config);

    let body = zero_test_method();
    let exploration = Interpreter::with_config(&body, config)
        .interpret(world_with_local(0, IntervalValue::top(ValueKind::Int)))
        .expect("explores");
    let trace = exploration.trace;
    assert_eq!(trace.steps.len() as u64, trace.metrics.instructions);
    assert!(trace.steps.iter().any(|step| step.fork_depth == 1));

    let json = serde_json::to_string(&trace).expect("serializes");
    let restored: ExplorationTrace = serde_json::from_str(&json).expect("deserializes");
    assert_eq!(restored, trace);
}
