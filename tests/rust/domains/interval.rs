use absint_domains::factory::IntervalFactory;
use absint_domains::interval::IntervalValue;
use absint_engine::factory::ValueFactory;
use absint_engine::value::{
    AbstractValue, ArithmeticOp, Comparison, ConcreteValue, Concretization, Conversion,
    NumericKind, ValueError, ValueKind,
};

fn int_op(left: IntervalValue, op: ArithmeticOp, right: IntervalValue) -> IntervalValue {
    left.arithmetic(op, NumericKind::Int, &right)
        .expect("int arithmetic")
}

#[test]
fn lattice_operations_on_int_ranges() {
    let low = IntervalValue::int_range(0, 3);
    let high = IntervalValue::int_range(10, 12);
    assert_eq!(low.union(&high), Ok(IntervalValue::int_range(0, 12)));
    assert!(low.intersection(&high).expect("meet").is_bottom());
    assert_eq!(
        IntervalValue::int_range(0, 10).intersection(&IntervalValue::int_range(5, 20)),
        Ok(IntervalValue::int_range(5, 10))
    );
    assert_eq!(
        IntervalValue::int_range(0, 10).minus(&IntervalValue::int(0)),
        Ok(IntervalValue::int_range(1, 10))
    );
    // A hole in the middle cannot be represented.
    assert_eq!(
        IntervalValue::int_range(0, 10).minus(&IntervalValue::int(5)),
        Ok(IntervalValue::int_range(0, 10))
    );
    assert_eq!(
        IntervalValue::int_range(0, 12).subsumes(&low),
        Ok(true)
    );
    assert_eq!(low.subsumes(&IntervalValue::int_range(0, 12)), Ok(false));
}

#[test]
fn mismatched_kinds_are_rejected_but_narrow_ints_unify() {
    assert_eq!(
        IntervalValue::int(1).union(&IntervalValue::long(1)),
        Err(ValueError::KindMismatch {
            op: "union",
            left: ValueKind::Int,
            right: ValueKind::Long,
        })
    );
    let short = IntervalFactory::new().short(-3);
    let joined = short.union(&IntervalValue::int(7)).expect("join");
    assert_eq!(joined, IntervalValue::int_range(-3, 7));
}

#[test]
fn top_and_bottom_per_kind() {
    for kind in [
        ValueKind::Int,
        ValueKind::Long,
        ValueKind::Double,
        ValueKind::Reference,
        ValueKind::ReturnAddress,
    ] {
        assert!(IntervalValue::top(kind).is_top(), "{kind:?} top");
        assert!(IntervalValue::bottom(kind).is_bottom(), "{kind:?} bottom");
        assert!(!IntervalValue::top(kind).is_bottom(), "{kind:?} top is not bottom");
        assert_eq!(IntervalValue::top(kind).kind(), kind);
    }
    assert!(IntervalValue::bottom(ValueKind::Int).make_concrete().is_empty());
}

#[test]
fn integer_arithmetic_follows_range_bounds() {
    assert_eq!(
        int_op(
            IntervalValue::int_range(1, 2),
            ArithmeticOp::Add,
            IntervalValue::int_range(10, 20)
        ),
        IntervalValue::int_range(11, 22)
    );
    assert_eq!(
        int_op(
            IntervalValue::int_range(-2, 3),
            ArithmeticOp::Mul,
            IntervalValue::int_range(-4, 5)
        ),
        IntervalValue::int_range(-12, 15)
    );
    assert_eq!(
        int_op(
            IntervalValue::int_range(10, 20),
            ArithmeticOp::Div,
            IntervalValue::int_range(-2, 2)
        ),
        IntervalValue::int_range(-20, 20)
    );
    assert!(int_op(IntervalValue::int(5), ArithmeticOp::Div, IntervalValue::int(0)).is_bottom());
    assert_eq!(
        int_op(IntervalValue::int(7), ArithmeticOp::Rem, IntervalValue::int(-3)),
        IntervalValue::int(1)
    );
    assert_eq!(
        int_op(
            IntervalValue::int_range(-5, 9),
            ArithmeticOp::Rem,
            IntervalValue::int(3)
        ),
        IntervalValue::int_range(-2, 2)
    );
}

#[test]
fn overflow_widens_to_the_full_kind() {
    let product = IntervalValue::long(i64::MAX)
        .arithmetic(ArithmeticOp::Mul, NumericKind::Long, &IntervalValue::long(2))
        .expect("lmul");
    assert!(product.is_top());
    assert_eq!(product.kind(), ValueKind::Long);

    let negated = IntervalValue::int(i32::MIN)
        .negate(NumericKind::Int)
        .expect("ineg");
    assert!(negated.is_top());
    assert_eq!(
        IntervalValue::int_range(-3, 8).negate(NumericKind::Int),
        Ok(IntervalValue::int_range(-8, 3))
    );
}

#[test]
fn bitwise_and_shift_bounds() {
    assert_eq!(
        int_op(
            IntervalValue::int_range(0, 12),
            ArithmeticOp::And,
            IntervalValue::int_range(0, 5)
        ),
        IntervalValue::int_range(0, 5)
    );
    assert_eq!(
        int_op(
            IntervalValue::int_range(0, 4),
            ArithmeticOp::Or,
            IntervalValue::int_range(0, 9)
        ),
        IntervalValue::int_range(0, 15)
    );
    assert_eq!(
        int_op(IntervalValue::int(6), ArithmeticOp::Xor, IntervalValue::int(3)),
        IntervalValue::int(5)
    );
    assert_eq!(
        int_op(
            IntervalValue::int_range(-8, 8),
            ArithmeticOp::Shr,
            IntervalValue::top(ValueKind::Int)
        ),
        IntervalValue::int_range(-8, 8)
    );
    let long_shift = IntervalValue::long(1)
        .arithmetic(ArithmeticOp::Shl, NumericKind::Long, &IntervalValue::int(65))
        .expect("lshl");
    assert_eq!(long_shift, IntervalValue::long(2));
}

#[test]
fn shift_distance_must_be_an_int() {
    let result = IntervalValue::long(1).arithmetic(
        ArithmeticOp::Shl,
        NumericKind::Long,
        &IntervalValue::long(1),
    );
    assert_eq!(
        result,
        Err(ValueError::KindMismatch {
            op: "arithmetic",
            left: ValueKind::Int,
            right: ValueKind::Long,
        })
    );
}

#[test]
fn floating_division_and_remainder_track_nan() {
    let quotient = IntervalValue::double(1.0)
        .arithmetic(
            ArithmeticOp::Div,
            NumericKind::Double,
            &IntervalValue::double_range(-1.0, 1.0, false),
        )
        .expect("ddiv");
    assert_eq!(
        quotient,
        IntervalValue::double_range(f64::NEG_INFINITY, f64::INFINITY, false)
    );

    let zero_by_zero = IntervalValue::double(0.0)
        .arithmetic(ArithmeticOp::Div, NumericKind::Double, &IntervalValue::double(0.0))
        .expect("ddiv");
    assert!(zero_by_zero
        .make_concrete()
        .contains(&ConcreteValue::Float(f64::NAN.into())));

    let remainder = IntervalValue::double(5.0)
        .arithmetic(ArithmeticOp::Rem, NumericKind::Double, &IntervalValue::double(0.0))
        .expect("drem");
    assert_eq!(remainder, IntervalValue::double(f64::NAN));

    assert_eq!(
        IntervalValue::double(1.5).arithmetic(
            ArithmeticOp::And,
            NumericKind::Double,
            &IntervalValue::double(1.0)
        ),
        Err(ValueError::IncompatibleKind {
            op: "arithmetic",
            kind: ValueKind::Double,
        })
    );
}

#[test]
fn float_results_are_rounded_to_single_precision() {
    let third = IntervalValue::float(1.0)
        .arithmetic(ArithmeticOp::Div, NumericKind::Float, &IntervalValue::float(3.0))
        .expect("fdiv");
    assert_eq!(third, IntervalValue::float(1.0 / 3.0));
}

#[test]
fn conversions_saturate_and_narrow() {
    let saturated = IntervalValue::double_range(-1e20, 3.7, true)
        .convert(Conversion::D2I)
        .expect("d2i");
    assert_eq!(saturated, IntervalValue::int_range(i32::MIN, 3));

    let narrowed = IntervalValue::int_range(100, 200)
        .convert(Conversion::I2B)
        .expect("i2b");
    assert!(narrowed.is_top());
    assert_eq!(narrowed.kind(), ValueKind::Byte);

    let kept = IntervalValue::int_range(1, 5)
        .convert(Conversion::I2L)
        .expect("i2l");
    assert_eq!(kept, IntervalValue::long_range(1, 5));

    let widened = IntervalValue::int(3).convert(Conversion::I2D).expect("i2d");
    assert_eq!(widened, IntervalValue::double(3.0));

    assert!(matches!(
        IntervalValue::long(1).convert(Conversion::I2L),
        Err(ValueError::KindMismatch { op: "convert", .. })
    ));
}

#[test]
fn comparisons_produce_sign_ranges() {
    assert_eq!(
        IntervalValue::long(1).compare(Comparison::Lcmp, &IntervalValue::long(2)),
        Ok(IntervalValue::int(-1))
    );
    assert_eq!(
        IntervalValue::long_range(0, 9).compare(Comparison::Lcmp, &IntervalValue::long(9)),
        Ok(IntervalValue::int_range(-1, 0))
    );
    let nan = IntervalValue::double(f64::NAN);
    assert_eq!(
        IntervalValue::double(5.0).compare(Comparison::Dcmpg, &nan),
        Ok(IntervalValue::int(1))
    );
    assert_eq!(
        IntervalValue::double(5.0).compare(Comparison::Dcmpl, &nan),
        Ok(IntervalValue::int(-1))
    );
}

#[test]
fn ordering_queries_compare_every_pair() {
    let low = IntervalValue::int_range(0, 3);
    assert_eq!(low.is_value_lower_than(&IntervalValue::int_range(4, 9)), Ok(true));
    assert_eq!(low.is_value_lower_than(&IntervalValue::int_range(3, 9)), Ok(false));
    assert_eq!(
        low.is_value_lower_or_equal_to(&IntervalValue::int_range(3, 9)),
        Ok(true)
    );
    assert_eq!(
        IntervalValue::int(10).is_value_greater_than(&low),
        Ok(true)
    );
    assert_eq!(
        IntervalValue::double(1.0)
            .is_value_lower_than(&IntervalValue::double_range(2.0, 3.0, true)),
        Ok(false)
    );
    assert!(matches!(
        IntervalValue::null().is_value_lower_than(&IntervalValue::null()),
        Err(ValueError::IncompatibleKind { .. })
    ));
}

#[test]
fn integer_bounds_and_concretization() {
    let range = IntervalValue::int_range(-3, 8);
    assert_eq!(range.lowest_possible_integer(), Ok(-3));
    assert_eq!(range.highest_possible_integer(), Ok(8));
    assert_eq!(
        IntervalValue::bottom(ValueKind::Int).lowest_possible_integer(),
        Err(ValueError::EmptyValue {
            op: "lowest_possible_integer"
        })
    );
    assert_eq!(
        IntervalValue::int_range(2, 4).make_concrete(),
        Concretization::Integers { low: 2, high: 4 }
    );
    assert_eq!(IntervalValue::non_null().make_concrete(), Concretization::Unbounded);
    assert_eq!(
        IntervalValue::null().make_concrete().single_value(),
        Some(ConcreteValue::Null)
    );
}

#[test]
fn nullness_refinement() {
    let maybe = IntervalValue::null().union(&IntervalValue::non_null()).expect("join");
    assert!(maybe.is_top());
    assert_eq!(maybe.minus(&IntervalValue::null()), Ok(IntervalValue::non_null()));
    assert_eq!(
        IntervalValue::non_null().minus(&IntervalValue::non_null()),
        Ok(IntervalValue::non_null())
    );
    assert!(IntervalValue::null()
        .intersection(&IntervalValue::non_null())
        .expect("meet")
        .is_bottom());
}

#[test]
fn return_addresses_are_tracked_as_sets() {
    let joined = IntervalValue::return_address(3)
        .union(&IntervalValue::return_address(7))
        .expect("join");
    assert_eq!(joined.make_concrete().len(), Some(2));
    assert!(joined
        .make_concrete()
        .contains(&ConcreteValue::ReturnAddress(7)));
    assert_eq!(
        joined.minus(&IntervalValue::return_address(3)),
        Ok(IntervalValue::return_address(7))
    );
}

#[test]
fn array_access_checks_reference_and_index() {
    let array = IntervalValue::non_null();
    let loaded = array
        .load_from_array(&IntervalValue::int_range(0, 3), ValueKind::Int)
        .expect("iaload");
    assert!(loaded.is_top());

    let from_null = IntervalValue::null()
        .load_from_array(&IntervalValue::int(0), ValueKind::Long)
        .expect("laload");
    assert!(from_null.is_bottom());
    assert_eq!(from_null.kind(), ValueKind::Long);

    let negative = array
        .load_from_array(&IntervalValue::int_range(-5, -1), ValueKind::Int)
        .expect("iaload");
    assert!(negative.is_bottom());

    assert_eq!(
        array.store_in_array(&IntervalValue::int(0), &IntervalValue::int(9)),
        Ok(())
    );
    assert!(array
        .store_in_array(&IntervalValue::long(0), &IntervalValue::int(9))
        .is_err());
    assert!(IntervalValue::int(0)
        .load_from_array(&IntervalValue::int(0), ValueKind::Int)
        .is_err());
}

#[test]
fn factory_seeds_only_matching_kinds() {
    let factory = IntervalFactory::new()
        .with_local(0, IntervalValue::int_range(1, 4))
        .with_local(1, IntervalValue::long(3))
        .with_static("demo/Limits/max:I", IntervalValue::int(99));

    assert_eq!(
        factory.local_value(0, ValueKind::Int),
        IntervalValue::int_range(1, 4)
    );
    assert!(factory.local_value(1, ValueKind::Int).is_top());
    assert!(factory.local_value(5, ValueKind::Reference).is_top());
    assert_eq!(
        factory.static_value("demo/Limits/max:I", ValueKind::Int),
        IntervalValue::int(99)
    );
    assert_eq!(factory.string("hello"), IntervalValue::non_null());
    assert_eq!(factory.short(7).kind(), ValueKind::Short);
    assert_eq!(factory.unconstrained(ValueKind::Float).kind(), ValueKind::Float);
}
