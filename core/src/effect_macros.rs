//! Declarative macros for ergonomic effect construction

/// Create an `Effect::Future` from an async block
///
/// # Example
///
/// ```
/// use reducer_kit_core::{async_effect, Effect};
///
/// #[derive(Clone, Debug)]
/// enum SearchAction {
///     Results(Vec<String>),
/// }
///
/// let query = String::from("rust");
/// let effect: Effect<SearchAction> = async_effect! {
///     Some(SearchAction::Results(vec![query]))
/// };
/// assert!(matches!(effect, Effect::Future(_)));
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

/// Create an `Effect::Delay` for scheduling delayed actions
///
/// # Example
///
/// ```
/// use reducer_kit_core::{delay, Effect};
/// use std::time::Duration;
///
/// #[derive(Clone, Debug)]
/// enum TimerAction {
///     Tick,
/// }
///
/// let effect: Effect<TimerAction> = delay! {
///     duration: Duration::from_secs(1),
///     action: TimerAction::Tick
/// };
/// assert!(matches!(effect, Effect::Delay { .. }));
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::delay($duration, $action)
    };
}

/// Run effects concurrently: `merge![a, b, c]`
#[macro_export]
macro_rules! merge {
    ($($effect:expr),* $(,)?) => {
        $crate::effect::Effect::merge(::std::vec![$($effect),*])
    };
}

/// Run effects one after another: `concatenate![a, b, c]`
#[macro_export]
macro_rules! concatenate {
    ($($effect:expr),* $(,)?) => {
        $crate::effect::Effect::concatenate(::std::vec![$($effect),*])
    };
}

#[cfg(test)]
mod tests {
    use crate::effect::Effect;
    use crate::effect_id::EffectId;
    use std::time::Duration;

    #[derive(Clone, Debug)]
    enum TestAction {
        Loaded { value: i32 },
        Tick,
    }

    #[test]
    fn test_async_effect_macro() {
        let effect = async_effect! {
            Some(TestAction::Loaded { value: 42 })
        };

        assert!(matches!(effect, Effect::Future(_)));
    }

    #[test]
    fn test_delay_macro() {
        let effect = delay! {
            duration: Duration::from_secs(30),
            action: TestAction::Tick
        };

        assert!(matches!(effect, Effect::Delay { duration, .. } if duration == Duration::from_secs(30)));
    }

    #[test]
    fn test_merge_and_concatenate_macros() {
        let merged: Effect<TestAction> = merge![
            Effect::send(TestAction::Tick),
            Effect::cancel(EffectId::new("timer")),
        ];
        let sequenced: Effect<TestAction> = concatenate![Effect::none(), Effect::none()];

        assert!(matches!(merged, Effect::Parallel(ref effects) if effects.len() == 2));
        assert!(matches!(sequenced, Effect::Sequential(ref effects) if effects.len() == 2));
    }
}
