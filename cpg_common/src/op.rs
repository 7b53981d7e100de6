//! Operator boilerplate for single-field numeric newtypes.

/// Implements an arithmetic operator for a tuple newtype by forwarding to the wrapped value.
///
/// * `op!(binary Money, Add, add)` implements `Money + Money`
/// * `op!(inplace Money, AddAssign, add_assign)` implements `Money += Money`
/// * `op!(unary Money, Neg, neg)` implements `-Money`
/// * `op!(checked Money, checked_add)` adds `Money::checked_add`, which returns `None` on overflow
///
/// The operator forms overflow the way the wrapped integer does. Arithmetic on stored balances uses the checked form.
#[macro_export]
macro_rules! op {
    (binary $type:ty, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $type {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self::Output {
                Self(std::ops::$trait::$method(self.0, rhs.0))
            }
        }
    };
    (inplace $type:ty, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $type {
            fn $method(&mut self, rhs: Self) {
                std::ops::$trait::$method(&mut self.0, rhs.0)
            }
        }
    };
    (checked $type:ty, $method:ident) => {
        impl $type {
            pub fn $method(self, rhs: Self) -> Option<Self> {
                self.0.$method(rhs.0).map(Self)
            }
        }
    };
    (unary $type:ty, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $type {
            type Output = Self;

            fn $method(self) -> Self::Output {
                Self(std::ops::$trait::$method(self.0))
            }
        }
    };
}
