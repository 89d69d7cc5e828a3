//! Context-driven abstract operations (spec.md §4.9): the `ToX` conversions
//! and comparisons that need to call back into script (`toString`/`valueOf`/
//! `Symbol.toPrimitive`), which is why these live in `exec` rather than on
//! `JsValue` itself (`value.rs` only covers the primitive-only subset that
//! doesn't need a `Context`).

use crate::ast::BinaryOp;
use crate::context::Context;
use crate::error::{JsNativeError, JsResult};
use crate::object::{JsObject, ObjectData};
use crate::property::PropertyKey;
use crate::string::JsString;
use crate::value::{number_to_string, JsValue, PreferredType};

/// §7.1.1 ToPrimitive.
pub fn to_primitive(ctx: &mut Context, value: &JsValue, hint: PreferredType) -> JsResult<JsValue> {
    let obj = match value {
        JsValue::Object(o) => o.clone(),
        other => return Ok(other.clone()),
    };

    let exotic = {
        let key = PropertyKey::Symbol(ctx.realm().well_known_symbols().to_primitive.clone());
        let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
        crate::object::operations::try_get(&obj, &key, value, &mut getter)?
    };
    if let Some(f) = exotic {
        if f.as_callable().is_some() {
            let hint_str = match hint {
                PreferredType::Default => "default",
                PreferredType::Number => "number",
                PreferredType::String => "string",
            };
            let result = ctx.call_function(&f, value, &[JsValue::from(hint_str)])?;
            if !result.is_object() {
                return Ok(result);
            }
            return Err(JsNativeError::typ("Symbol.toPrimitive must return a primitive").into());
        }
    }

    let method_names: [&str; 2] = match hint {
        PreferredType::String => ["toString", "valueOf"],
        _ => ["valueOf", "toString"],
    };
    for name in method_names {
        let key = PropertyKey::from_str(name);
        let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
        let method = crate::object::operations::try_get(&obj, &key, value, &mut getter)?;
        if let Some(f) = method {
            if f.as_callable().is_some() {
                let result = ctx.call_function(&f, value, &[])?;
                if !result.is_object() {
                    return Ok(result);
                }
            }
        }
    }
    Err(JsNativeError::typ("cannot convert object to primitive value").into())
}

/// §7.1.17 ToPropertyKey.
pub fn to_property_key(ctx: &mut Context, value: &JsValue) -> JsResult<PropertyKey> {
    if let Some(key) = value.to_property_key_primitive() {
        return Ok(key);
    }
    let primitive = to_primitive(ctx, value, PreferredType::String)?;
    primitive
        .to_property_key_primitive()
        .ok_or_else(|| JsNativeError::typ("cannot convert value to a property key").into())
}

/// §7.1.4 ToNumber.
pub fn to_number(ctx: &mut Context, value: &JsValue) -> JsResult<f64> {
    match value {
        JsValue::Number(n) => Ok(*n),
        JsValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        JsValue::Undefined => Ok(f64::NAN),
        JsValue::Null => Ok(0.0),
        JsValue::String(s) => Ok(string_to_number(s.as_str())),
        JsValue::BigInt(_) => Err(JsNativeError::typ("cannot convert a BigInt to a number").into()),
        JsValue::Symbol(_) => Err(JsNativeError::typ("cannot convert a Symbol to a number").into()),
        JsValue::Object(_) => {
            let primitive = to_primitive(ctx, value, PreferredType::Number)?;
            to_number(ctx, &primitive)
        }
    }
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map(|n| n as f64).unwrap_or(f64::NAN);
    }
    if let Some(oct) = trimmed.strip_prefix("0o").or_else(|| trimmed.strip_prefix("0O")) {
        return i64::from_str_radix(oct, 8).map(|n| n as f64).unwrap_or(f64::NAN);
    }
    if let Some(bin) = trimmed.strip_prefix("0b").or_else(|| trimmed.strip_prefix("0B")) {
        return i64::from_str_radix(bin, 2).map(|n| n as f64).unwrap_or(f64::NAN);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => fast_float2::parse(trimmed).unwrap_or(f64::NAN),
    }
}

/// §7.1.12 ToString (the general case, calling `toString` when needed).
pub fn to_string(ctx: &mut Context, value: &JsValue) -> JsResult<JsString> {
    if let Some(s) = value.to_primitive_string() {
        return Ok(s);
    }
    let primitive = to_primitive(ctx, value, PreferredType::String)?;
    primitive
        .to_primitive_string()
        .ok_or_else(|| JsNativeError::typ("cannot convert value to a string").into())
}

/// §7.1.18 ToObject.
pub fn to_object(ctx: &mut Context, value: &JsValue) -> JsResult<JsObject> {
    match value {
        JsValue::Object(o) => Ok(o.clone()),
        JsValue::Undefined | JsValue::Null => Err(JsNativeError::typ("cannot convert undefined or null to object").into()),
        JsValue::Boolean(b) => Ok(JsObject::new(ObjectData::Boolean(*b), JsValue::Object(ctx.realm().boolean_prototype().clone()))),
        JsValue::Number(n) => Ok(JsObject::new(ObjectData::Number(*n), JsValue::Object(ctx.realm().number_prototype().clone()))),
        JsValue::String(s) => Ok(JsObject::new(ObjectData::String(s.clone()), JsValue::Object(ctx.realm().string_prototype().clone()))),
        JsValue::Symbol(_) | JsValue::BigInt(_) => Ok(JsObject::ordinary(JsValue::Object(ctx.realm().object_prototype().clone()))),
    }
}

/// §7.2.14 IsLooselyEqual.
pub fn abstract_equals(ctx: &mut Context, a: &JsValue, b: &JsValue) -> JsResult<bool> {
    use JsValue::*;
    Ok(match (a, b) {
        (Null | Undefined, Null | Undefined) => true,
        (Number(_), Number(_))
        | (String(_), String(_))
        | (Boolean(_), Boolean(_))
        | (BigInt(_), BigInt(_))
        | (Symbol(_), Symbol(_))
        | (Object(_), Object(_)) => JsValue::strict_equals(a, b),
        (Number(x), String(s)) | (String(s), Number(x)) => *x == string_to_number(s.as_str()),
        (BigInt(x), String(s)) | (String(s), BigInt(x)) => {
            match crate::bigint::JsBigInt::from_string(s.as_str(), 10) {
                Some(y) => x.cmp(&y) == std::cmp::Ordering::Equal,
                None => false,
            }
        }
        (Boolean(_), _) => abstract_equals(ctx, &Number(to_number(ctx, a)?), b)?,
        (_, Boolean(_)) => abstract_equals(ctx, a, &Number(to_number(ctx, b)?))?,
        (Number(x), BigInt(y)) | (BigInt(y), Number(x)) => {
            !x.is_nan() && !x.is_infinite() && x.fract() == 0.0 && crate::bigint::JsBigInt::new(*x as i64).cmp(y) == std::cmp::Ordering::Equal
        }
        (Object(_), Number(_) | String(_) | BigInt(_) | Symbol(_)) => {
            let primitive = to_primitive(ctx, a, PreferredType::Default)?;
            abstract_equals(ctx, &primitive, b)?
        }
        (Number(_) | String(_) | BigInt(_) | Symbol(_), Object(_)) => {
            let primitive = to_primitive(ctx, b, PreferredType::Default)?;
            abstract_equals(ctx, a, &primitive)?
        }
        _ => false,
    })
}

/// §7.3.22 InstanceofOperator, modulo `Symbol.hasInstance` override.
pub fn instance_of(ctx: &mut Context, value: &JsValue, constructor: &JsValue) -> JsResult<bool> {
    let ctor_obj = constructor
        .as_object()
        .ok_or_else(|| JsNativeError::typ("right-hand side of 'instanceof' is not callable"))?;
    if !ctor_obj.is_callable() {
        return Err(JsNativeError::typ("right-hand side of 'instanceof' is not callable").into());
    }
    let has_instance_key = PropertyKey::Symbol(ctx.realm().well_known_symbols().has_instance.clone());
    let mut getter = |g: &JsValue, r: &JsValue, a: &[JsValue]| ctx.call_function(g, r, a);
    let has_instance = crate::object::operations::try_get(ctor_obj, &has_instance_key, constructor, &mut getter)?;
    if let Some(f) = has_instance {
        if f.as_callable().is_some() {
            let result = ctx.call_function(&f, constructor, &[value.clone()])?;
            return Ok(result.to_boolean());
        }
    }
    ordinary_has_instance(value, ctor_obj)
}

fn ordinary_has_instance(value: &JsValue, ctor_obj: &JsObject) -> JsResult<bool> {
    let Some(obj) = value.as_object() else { return Ok(false) };
    let target = match crate::object::operations::try_get(
        ctor_obj,
        &PropertyKey::from_str("prototype"),
        &JsValue::Object(ctor_obj.clone()),
        &mut |_, _, _| Ok(JsValue::undefined()),
    )? {
        Some(JsValue::Object(p)) => p,
        _ => return Err(JsNativeError::typ("function has non-object prototype").into()),
    };
    let mut proto = obj.prototype();
    loop {
        match proto {
            JsValue::Object(p) => {
                if JsObject::ptr_eq(&p, &target) {
                    return Ok(true);
                }
                proto = p.prototype();
            }
            _ => return Ok(false),
        }
    }
}

/// §13.10 the "in" operator.
pub fn has_property(obj: &JsObject, key: &PropertyKey) -> bool {
    crate::object::operations::own_keys(obj).contains(key)
        || match obj.prototype() {
            JsValue::Object(p) => has_property(&p, key),
            _ => false,
        }
}

/// The four arithmetic/bitwise/relational binary operators that aren't
/// equality or logical (spec.md §4.9 evaluator; dispatched from
/// `expression::eval_binary`), generalized over Number/String/BigInt per
/// §13.15 ApplyStringOrNumericBinaryOperator.
pub fn apply_binary(ctx: &mut Context, op: BinaryOp, left: &JsValue, right: &JsValue) -> JsResult<JsValue> {
    use BinaryOp::*;
    match op {
        Add => {
            let lp = to_primitive(ctx, left, PreferredType::Default)?;
            let rp = to_primitive(ctx, right, PreferredType::Default)?;
            if lp.is_string() || rp.is_string() {
                let ls = to_string(ctx, &lp)?;
                let rs = to_string(ctx, &rp)?;
                return Ok(JsValue::from(ls.concat(&rs)));
            }
            if let (JsValue::BigInt(a), JsValue::BigInt(b)) = (&lp, &rp) {
                return Ok(JsValue::from(a.add(b)));
            }
            Ok(JsValue::from(to_number(ctx, &lp)? + to_number(ctx, &rp)?))
        }
        Sub | Mul | Div | Mod | Pow | BitAnd | BitOr | BitXor | Shl | Shr | UShr => {
            numeric_binary(ctx, op, left, right)
        }
        Eq => Ok(JsValue::from(abstract_equals(ctx, left, right)?)),
        NotEq => Ok(JsValue::from(!abstract_equals(ctx, left, right)?)),
        StrictEq => Ok(JsValue::from(JsValue::strict_equals(left, right))),
        StrictNotEq => Ok(JsValue::from(!JsValue::strict_equals(left, right))),
        Lt | LtEq | Gt | GtEq => relational(ctx, op, left, right),
        In => {
            let obj = right
                .as_object()
                .ok_or_else(|| JsNativeError::typ("cannot use 'in' operator on a non-object"))?;
            let key = to_property_key(ctx, left)?;
            Ok(JsValue::from(has_property(obj, &key)))
        }
        InstanceOf => Ok(JsValue::from(instance_of(ctx, left, right)?)),
    }
}

fn numeric_binary(ctx: &mut Context, op: BinaryOp, left: &JsValue, right: &JsValue) -> JsResult<JsValue> {
    use BinaryOp::*;
    let lp = to_primitive(ctx, left, PreferredType::Number)?;
    let rp = to_primitive(ctx, right, PreferredType::Number)?;
    if let (JsValue::BigInt(a), JsValue::BigInt(b)) = (&lp, &rp) {
        return Ok(JsValue::from(match op {
            Sub => a.sub(b),
            Mul => a.mul(b),
            Div => a.div(b)?,
            Mod => a.rem(b)?,
            Pow => a.pow(b)?,
            BitAnd => a.bitand(b),
            BitOr => a.bitor(b),
            BitXor => a.bitxor(b),
            Shl => a.shl(to_number(ctx, &rp)? as u32),
            Shr => a.shr(to_number(ctx, &rp)? as u32),
            UShr => return Err(JsNativeError::typ("BigInts have no unsigned right shift").into()),
            _ => unreachable!(),
        }));
    }
    let a = to_number(ctx, &lp)?;
    let b = to_number(ctx, &rp)?;
    Ok(JsValue::from(match op {
        Sub => a - b,
        Mul => a * b,
        Div => a / b,
        Mod => a % b,
        Pow => a.powf(b),
        BitAnd => (to_int32(a) & to_int32(b)) as f64,
        BitOr => (to_int32(a) | to_int32(b)) as f64,
        BitXor => (to_int32(a) ^ to_int32(b)) as f64,
        Shl => (to_int32(a) << (to_uint32(b) & 31)) as f64,
        Shr => (to_int32(a) >> (to_uint32(b) & 31)) as f64,
        UShr => (to_uint32(a) >> (to_uint32(b) & 31)) as f64,
        _ => unreachable!(),
    }))
}

fn relational(ctx: &mut Context, op: BinaryOp, left: &JsValue, right: &JsValue) -> JsResult<JsValue> {
    use BinaryOp::*;
    let lp = to_primitive(ctx, left, PreferredType::Number)?;
    let rp = to_primitive(ctx, right, PreferredType::Number)?;
    if let (JsValue::String(a), JsValue::String(b)) = (&lp, &rp) {
        let ord = a.as_str().cmp(b.as_str());
        return Ok(JsValue::from(match op {
            Lt => ord.is_lt(),
            LtEq => ord.is_le(),
            Gt => ord.is_gt(),
            GtEq => ord.is_ge(),
            _ => unreachable!(),
        }));
    }
    let a = to_number(ctx, &lp)?;
    let b = to_number(ctx, &rp)?;
    if a.is_nan() || b.is_nan() {
        return Ok(JsValue::from(false));
    }
    Ok(JsValue::from(match op {
        Lt => a < b,
        LtEq => a <= b,
        Gt => a > b,
        GtEq => a >= b,
        _ => unreachable!(),
    }))
}

/// §7.1.6 ToInt32.
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let m = n.trunc().rem_euclid(4294967296.0);
    if m >= 2147483648.0 {
        (m - 4294967296.0) as i32
    } else {
        m as i32
    }
}

/// §7.1.7 ToUint32.
pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    n.trunc().rem_euclid(4294967296.0) as u32
}

pub fn numeric_to_display(n: f64) -> String {
    number_to_string(n)
}
