//! Secure Enclave store for iOS and macOS.
//!
//! Keys are P-256 keys created inside the Secure Enclave with
//! `SecKeyCreateRandomKey` and found again by application tag. The access
//! policy becomes a `SecAccessControl`, so the system itself refuses key use
//! without the required biometry or passcode.
//!
//! Gated keys are only used through an `LAContext` evaluated for the
//! provider's current [`AuthContext`]. The context carries the reuse
//! duration, so key use inside the window does not prompt again.
//!
//! The Secure Enclave has no per-key certificate chain. Keys are attested
//! with a statement signed by a second enclave key (tag
//! `vaultkey.attestation`). Policies and stored chains live in generic
//! password items under the `vaultkey` service.

use std::collections::HashMap;
use std::ptr::null_mut;
use std::sync::Mutex;

use async_trait::async_trait;
use block2::RcBlock;
use chrono::{DateTime, Utc};
use core_foundation::base::{CFType, TCFType};
use core_foundation::boolean::CFBoolean;
use core_foundation::data::CFData;
use core_foundation::dictionary::CFDictionary;
use core_foundation::error::CFError;
use core_foundation::number::CFNumber;
use core_foundation::string::CFString;
use core_foundation_sys::base::{kCFAllocatorDefault, CFRelease, CFTypeRef, OSStatus};
use core_foundation_sys::error::CFErrorRef;
use core_foundation_sys::string::CFStringRef;
use objc2::rc::Retained;
use objc2::runtime::Bool;
use objc2_foundation::{NSError, NSString};
use objc2_local_authentication::{LAContext, LAPolicy};
use security_framework_sys::access_control::{
    kSecAttrAccessibleWhenUnlockedThisDeviceOnly, SecAccessControlCreateWithFlags,
};
use security_framework_sys::base::{errSecItemNotFound, errSecSuccess, SecKeyRef};
use security_framework_sys::item::{
    kSecAttrAccessControl, kSecAttrAccount, kSecAttrApplicationTag, kSecAttrIsPermanent,
    kSecAttrKeySizeInBits, kSecAttrKeyType, kSecAttrKeyTypeECSECPrimeRandom, kSecAttrService,
    kSecAttrTokenID, kSecAttrTokenIDSecureEnclave, kSecClass, kSecClassGenericPassword,
    kSecClassKey, kSecPrivateKeyAttrs, kSecReturnData, kSecReturnRef, kSecValueData,
};
use security_framework_sys::key::{
    kSecKeyAlgorithmECDSASignatureMessageX962SHA256, SecKeyCopyExternalRepresentation,
    SecKeyCopyPublicKey, SecKeyCreateRandomKey, SecKeyCreateSignature,
};
use security_framework_sys::keychain_item::{SecItemAdd, SecItemCopyMatching, SecItemDelete};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use vaultkey_crypto::{EcCurve, EcPublicKey, EcSignature, SignatureAlgorithm};

use crate::attestation::{statement_chain, AttestationStatement};
use crate::error::KeyringError;
use crate::ops::{AccessControlFlags, NativeAccessDescriptor};
use crate::platform::PlatformCapabilities;
use crate::store::{ensure_algorithm, GenerateRequest, GeneratedKey, SecureStore, StoredKey};
use crate::types::{AccessPolicy, AuthContext, BiometricStrength};

#[link(name = "Security", kind = "framework")]
extern "C" {
    static kSecUseAuthenticationContext: CFStringRef;
}

const SERVICE: &str = "vaultkey";
const ATTESTATION_KEY_TAG: &str = "vaultkey.attestation";

const ERR_SEC_USER_CANCELED: isize = -128;
const ERR_SEC_AUTH_FAILED: isize = -25293;
const ERR_SEC_INTERACTION_NOT_ALLOWED: isize = -25308;
const LA_ERROR_AUTHENTICATION_FAILED: isize = -1;
const LA_ERROR_USER_CANCEL: isize = -2;
const LA_ERROR_SYSTEM_CANCEL: isize = -4;
const LA_ERROR_APP_CANCEL: isize = -9;

const UNLOCK_REASON: &str = "Unlock signing key";

/// Owned `SecKeyRef`, released on drop.
struct KeyRef(SecKeyRef);

// Safety: SecKey objects are immutable and Security.framework allows their
// use from any thread.
unsafe impl Send for KeyRef {}
unsafe impl Sync for KeyRef {}

impl Drop for KeyRef {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { CFRelease(self.0 as CFTypeRef) };
        }
    }
}

impl KeyRef {
    fn public_key(&self) -> Result<EcPublicKey, KeyringError> {
        let public = unsafe { SecKeyCopyPublicKey(self.0) };
        if public.is_null() {
            return Err(KeyringError::store_access("public key unavailable"));
        }
        let public = KeyRef(public);

        let mut error: CFErrorRef = null_mut();
        let data_ref = unsafe { SecKeyCopyExternalRepresentation(public.0, &mut error) };
        if data_ref.is_null() {
            return Err(KeyringError::store_access(describe(error, "public key export")));
        }
        let data = unsafe { CFData::wrap_under_create_rule(data_ref) };
        Ok(EcPublicKey::from_sec1(EcCurve::P256, data.bytes())?)
    }

    /// ECDSA P-256 over `data`, DER encoded.
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, KeyringError> {
        let cfdata = CFData::from_buffer(data);
        let mut error: CFErrorRef = null_mut();
        let signature = unsafe {
            SecKeyCreateSignature(
                self.0,
                kSecKeyAlgorithmECDSASignatureMessageX962SHA256,
                cfdata.as_concrete_TypeRef(),
                &mut error,
            )
        };
        if signature.is_null() {
            return Err(signing_error(error));
        }
        let sig = unsafe { CFData::wrap_under_create_rule(signature) };
        Ok(sig.bytes().to_vec())
    }
}

/// Owned `LAContext`.
struct LaContext(Retained<LAContext>);

// Safety: LAContext is thread safe; evaluation runs on a private queue.
unsafe impl Send for LaContext {}
unsafe impl Sync for LaContext {}

impl LaContext {
    fn new(reuse_seconds: u32) -> Self {
        let context = unsafe { LAContext::new() };
        unsafe { context.setTouchIDAuthenticationAllowableReuseDuration(f64::from(reuse_seconds)) };
        Self(context)
    }

    /// Start evaluating `policy`; the receiver resolves when the system
    /// prompt is answered.
    fn start_evaluation(&self, policy: &AccessPolicy) -> oneshot::Receiver<Result<(), KeyringError>> {
        let la_policy = match policy.biometric_strength {
            BiometricStrength::Strong => LAPolicy::DeviceOwnerAuthenticationWithBiometrics,
            BiometricStrength::Weak | BiometricStrength::None => LAPolicy::DeviceOwnerAuthentication,
        };

        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let reply = RcBlock::new(move |success: Bool, error: *mut NSError| {
            let outcome = if success.as_bool() {
                Ok(())
            } else {
                Err(evaluation_error(unsafe { error.as_ref() }))
            };
            if let Some(tx) = tx.lock().ok().and_then(|mut slot| slot.take()) {
                let _ = tx.send(outcome);
            }
        });

        let reason = NSString::from_str(UNLOCK_REASON);
        unsafe {
            self.0
                .evaluatePolicy_localizedReason_reply(la_policy, &reason, &reply);
        }
        rx
    }

    fn as_cf_type(&self) -> CFType {
        unsafe { CFType::wrap_under_get_rule(Retained::as_ptr(&self.0).cast()) }
    }
}

impl Drop for LaContext {
    fn drop(&mut self) {
        unsafe { self.0.invalidate() };
    }
}

fn evaluation_error(error: Option<&NSError>) -> KeyringError {
    let Some(error) = error else {
        return KeyringError::AuthenticationFailed {
            code: 0,
            message: "LAContext evaluation failed".to_string(),
        };
    };
    let code = error.code();
    match code {
        LA_ERROR_USER_CANCEL | LA_ERROR_SYSTEM_CANCEL | LA_ERROR_APP_CANCEL => KeyringError::Cancelled,
        _ => KeyringError::AuthenticationFailed {
            code: i32::try_from(code).unwrap_or(i32::MIN),
            message: error.localizedDescription().to_string(),
        },
    }
}

/// `LAContext` evaluated for one [`AuthContext`].
struct EvaluatedContext {
    id: String,
    context: LaContext,
    spent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextUse {
    /// The cached evaluation covers this sign.
    Reuse,
    /// A new context must be evaluated first.
    Evaluate,
}

/// Decide how a sign with `auth` is unlocked given the cached evaluation
/// (`id`, spent) for the key.
fn context_use(
    cached: Option<(&str, bool)>,
    auth: &AuthContext,
    now: DateTime<Utc>,
) -> Result<ContextUse, KeyringError> {
    if now < auth.authenticated_at || (auth.reuse_seconds > 0 && !auth.is_valid_at(now)) {
        return Err(KeyringError::AuthenticationRequired);
    }
    match cached {
        Some((id, true)) if id == auth.id => Err(KeyringError::AuthenticationRequired),
        Some((id, false)) if id == auth.id => Ok(ContextUse::Reuse),
        _ => Ok(ContextUse::Evaluate),
    }
}

fn describe(error: CFErrorRef, what: &str) -> String {
    if error.is_null() {
        return format!("{what} failed");
    }
    let error = unsafe { CFError::wrap_under_create_rule(error) };
    format!("{what} failed ({}): {}", error.code(), error.description())
}

fn signing_error(error: CFErrorRef) -> KeyringError {
    if error.is_null() {
        return KeyringError::signing("Secure Enclave signing failed");
    }
    let error = unsafe { CFError::wrap_under_create_rule(error) };
    let code = error.code();
    match code {
        ERR_SEC_USER_CANCELED | LA_ERROR_USER_CANCEL => KeyringError::Cancelled,
        ERR_SEC_INTERACTION_NOT_ALLOWED => KeyringError::AuthenticationRequired,
        ERR_SEC_AUTH_FAILED | LA_ERROR_AUTHENTICATION_FAILED => KeyringError::AuthenticationFailed {
            code: i32::try_from(code).unwrap_or(i32::MIN),
            message: error.description().to_string(),
        },
        _ => {
            error!(code, "SecKeyCreateSignature failed: {}", error.description());
            KeyringError::signing(format!("Secure Enclave signing failed ({code})"))
        },
    }
}

fn key(constant: CFStringRef) -> CFString {
    unsafe { CFString::wrap_under_get_rule(constant) }
}

fn value(constant: CFStringRef) -> CFType {
    unsafe { CFType::wrap_under_get_rule(constant as CFTypeRef) }
}

fn key_tag(alias: &str) -> String {
    format!("vaultkey.key.{alias}")
}

fn key_query(tag: &str) -> Vec<(CFString, CFType)> {
    vec![
        (key(kSecClass), value(kSecClassKey)),
        (key(kSecAttrApplicationTag), CFData::from_buffer(tag.as_bytes()).as_CFType()),
        (key(kSecAttrKeyType), value(kSecAttrKeyTypeECSECPrimeRandom)),
    ]
}

fn password_query(account: &str) -> Vec<(CFString, CFType)> {
    vec![
        (key(kSecClass), value(kSecClassGenericPassword)),
        (key(kSecAttrService), CFString::new(SERVICE).as_CFType()),
        (key(kSecAttrAccount), CFString::new(account).as_CFType()),
    ]
}

fn find_key(tag: &str) -> Result<Option<KeyRef>, KeyringError> {
    find_key_with(tag, None)
}

fn find_key_with(tag: &str, context: Option<&LaContext>) -> Result<Option<KeyRef>, KeyringError> {
    let mut pairs = key_query(tag);
    pairs.push((key(kSecReturnRef), CFBoolean::true_value().as_CFType()));
    if let Some(context) = context {
        pairs.push((key(unsafe { kSecUseAuthenticationContext }), context.as_cf_type()));
    }
    let query = CFDictionary::from_CFType_pairs(&pairs);

    let mut result: CFTypeRef = null_mut();
    let status = unsafe { SecItemCopyMatching(query.as_concrete_TypeRef(), &mut result) };
    match status {
        s if s == errSecSuccess && !result.is_null() => Ok(Some(KeyRef(result as SecKeyRef))),
        s if s == errSecItemNotFound || s == errSecSuccess => Ok(None),
        s => Err(KeyringError::store_access(format!("SecItemCopyMatching failed: {s}"))),
    }
}

fn delete_items(pairs: &[(CFString, CFType)], what: &str) -> Result<(), KeyringError> {
    let query = CFDictionary::from_CFType_pairs(pairs);
    let status: OSStatus = unsafe { SecItemDelete(query.as_concrete_TypeRef()) };
    if status == errSecSuccess || status == errSecItemNotFound {
        Ok(())
    } else {
        Err(KeyringError::store_access(format!("SecItemDelete {what} failed: {status}")))
    }
}

fn create_enclave_key(tag: &str, flags: AccessControlFlags) -> Result<KeyRef, KeyringError> {
    let mut error: CFErrorRef = null_mut();
    let access = unsafe {
        SecAccessControlCreateWithFlags(
            kCFAllocatorDefault,
            kSecAttrAccessibleWhenUnlockedThisDeviceOnly as CFTypeRef,
            flags.bits().into(),
            &mut error,
        )
    };
    if access.is_null() {
        return Err(KeyringError::key_generation(describe(error, "SecAccessControlCreateWithFlags")));
    }
    // Owned by `access` from here on; released once when it drops.
    let access = unsafe { CFType::wrap_under_create_rule(access as CFTypeRef) };

    let private_attrs = CFDictionary::from_CFType_pairs(&[
        (key(kSecAttrIsPermanent), CFBoolean::true_value().as_CFType()),
        (key(kSecAttrApplicationTag), CFData::from_buffer(tag.as_bytes()).as_CFType()),
        (key(kSecAttrAccessControl), access),
    ]);

    let key_attrs = CFDictionary::from_CFType_pairs(&[
        (key(kSecAttrKeyType), value(kSecAttrKeyTypeECSECPrimeRandom)),
        (key(kSecAttrKeySizeInBits), CFNumber::from(256i32).as_CFType()),
        (key(kSecAttrTokenID), value(kSecAttrTokenIDSecureEnclave)),
        (key(kSecPrivateKeyAttrs), private_attrs.as_CFType()),
    ]);

    let mut error: CFErrorRef = null_mut();
    let key_ref = unsafe { SecKeyCreateRandomKey(key_attrs.as_concrete_TypeRef(), &mut error) };
    if key_ref.is_null() {
        return Err(KeyringError::key_generation(describe(error, "SecKeyCreateRandomKey")));
    }
    Ok(KeyRef(key_ref))
}

fn write_item(account: &str, bytes: &[u8]) -> Result<(), KeyringError> {
    delete_items(&password_query(account), account)?;

    let mut pairs = password_query(account);
    pairs.push((key(kSecValueData), CFData::from_buffer(bytes).as_CFType()));
    let attrs = CFDictionary::from_CFType_pairs(&pairs);

    let status = unsafe { SecItemAdd(attrs.as_concrete_TypeRef(), null_mut()) };
    if status != errSecSuccess {
        return Err(KeyringError::store_access(format!("SecItemAdd {account} failed: {status}")));
    }
    Ok(())
}

fn read_item(account: &str) -> Result<Option<Vec<u8>>, KeyringError> {
    let mut pairs = password_query(account);
    pairs.push((key(kSecReturnData), CFBoolean::true_value().as_CFType()));
    let query = CFDictionary::from_CFType_pairs(&pairs);

    let mut result: CFTypeRef = null_mut();
    let status = unsafe { SecItemCopyMatching(query.as_concrete_TypeRef(), &mut result) };
    if status == errSecItemNotFound || (status == errSecSuccess && result.is_null()) {
        return Ok(None);
    }
    if status != errSecSuccess {
        return Err(KeyringError::store_access(format!("SecItemCopyMatching {account} failed: {status}")));
    }
    let data = unsafe { CFData::wrap_under_create_rule(result as _) };
    Ok(Some(data.bytes().to_vec()))
}

fn policy_account(alias: &str) -> String {
    format!("{alias}#policy")
}

fn chain_account(alias: &str) -> String {
    format!("{alias}#chain")
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyMetadata {
    algorithm: SignatureAlgorithm,
    policy: AccessPolicy,
}

/// Secure Enclave store.
pub struct AppleKeychain {
    capabilities: PlatformCapabilities,
    attestation_key: KeyRef,
    attestation_public: EcPublicKey,
    /// Last evaluated context per alias.
    contexts: Mutex<HashMap<String, EvaluatedContext>>,
}

impl std::fmt::Debug for AppleKeychain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppleKeychain")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl AppleKeychain {
    /// Open the store, creating the enclave attestation key on first use.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::KeyGeneration`] if the Secure Enclave is
    /// unavailable (no enclave, or a binary without keychain entitlements).
    pub fn new(capabilities: PlatformCapabilities) -> Result<Self, KeyringError> {
        let attestation_key = match find_key(ATTESTATION_KEY_TAG)? {
            Some(existing) => existing,
            None => {
                info!("Creating Secure Enclave attestation key");
                create_enclave_key(ATTESTATION_KEY_TAG, AccessControlFlags::PRIVATE_KEY_USAGE)?
            },
        };
        let attestation_public = attestation_key.public_key()?;

        info!(attestation = capabilities.attestation, "AppleKeychain created");
        Ok(Self {
            capabilities,
            attestation_key,
            attestation_public,
            contexts: Mutex::new(HashMap::new()),
        })
    }

    fn forget_context(&self, alias: &str) -> Result<(), KeyringError> {
        self.contexts
            .lock()
            .map_err(|_| KeyringError::store_access("Lock poisoned"))?
            .remove(alias);
        Ok(())
    }

    /// Sign with a gated key through the `LAContext` for `auth`, evaluating
    /// a new one when `auth` has not been seen for this key.
    async fn sign_gated(
        &self,
        alias: &str,
        policy: &AccessPolicy,
        data: &[u8],
        auth: &AuthContext,
    ) -> Result<Vec<u8>, KeyringError> {
        let cached = {
            let contexts = self
                .contexts
                .lock()
                .map_err(|_| KeyringError::store_access("Lock poisoned"))?;
            let entry = contexts.get(alias);
            context_use(entry.map(|e| (e.id.as_str(), e.spent)), auth, Utc::now())?
        };

        if cached == ContextUse::Evaluate {
            debug!(alias = %alias, reuse_seconds = auth.reuse_seconds, "Evaluating LAContext");
            let context = LaContext::new(auth.reuse_seconds);
            context
                .start_evaluation(policy)
                .await
                .map_err(|_| KeyringError::Cancelled)??;
            self.contexts
                .lock()
                .map_err(|_| KeyringError::store_access("Lock poisoned"))?
                .insert(
                    alias.to_string(),
                    EvaluatedContext {
                        id: auth.id.clone(),
                        context,
                        spent: false,
                    },
                );
        }

        let mut contexts = self
            .contexts
            .lock()
            .map_err(|_| KeyringError::store_access("Lock poisoned"))?;
        let entry = contexts
            .get_mut(alias)
            .filter(|e| e.id == auth.id)
            .ok_or(KeyringError::AuthenticationRequired)?;
        let key_ref = find_key_with(&key_tag(alias), Some(&entry.context))?
            .ok_or_else(|| KeyringError::key_not_found(alias))?;
        let der = key_ref.sign(data)?;
        if auth.reuse_seconds == 0 {
            entry.spent = true;
        }
        Ok(der)
    }

    fn metadata(alias: &str) -> Result<Option<KeyMetadata>, KeyringError> {
        let Some(bytes) = read_item(&policy_account(alias))? else {
            return Ok(None);
        };
        let metadata = serde_json::from_slice(&bytes)
            .map_err(|e| KeyringError::store_access(format!("Corrupt policy item {alias}: {e}")))?;
        Ok(Some(metadata))
    }
}

#[async_trait]
impl SecureStore for AppleKeychain {
    fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities.clone()
    }

    async fn contains(&self, alias: &str) -> Result<bool, KeyringError> {
        let exists = find_key(&key_tag(alias))?.is_some();
        debug!(alias = %alias, exists, "Key existence check complete");
        Ok(exists)
    }

    async fn delete(&self, alias: &str) -> Result<(), KeyringError> {
        delete_items(&key_query(&key_tag(alias)), alias)?;
        delete_items(&password_query(&policy_account(alias)), alias)?;
        self.forget_context(alias)?;
        info!(alias = %alias, "Key deleted from Secure Enclave");
        Ok(())
    }

    async fn generate(&self, request: GenerateRequest) -> Result<GeneratedKey, KeyringError> {
        let NativeAccessDescriptor::AccessControl(spec) = request.descriptor else {
            return Err(KeyringError::policy_unsupported(format!(
                "Secure Enclave cannot apply {:?}",
                request.descriptor
            )));
        };
        if request.algorithm != SignatureAlgorithm::Es256 {
            return Err(KeyringError::key_generation(format!(
                "secure enclave only supports ES256, not {}",
                request.algorithm
            )));
        }
        if request.attestation_challenge.is_some() && !self.capabilities.attestation {
            return Err(KeyringError::attestation_unavailable("attestation disabled"));
        }

        info!(
            alias = %request.alias,
            flags = spec.flags.bits(),
            "Generating key in Secure Enclave"
        );

        self.forget_context(&request.alias)?;
        let key_ref = create_enclave_key(&key_tag(&request.alias), spec.flags)?;
        let public_key = key_ref.public_key()?;

        let metadata = KeyMetadata {
            algorithm: request.algorithm,
            policy: request.policy,
        };
        let encoded = serde_json::to_vec(&metadata)
            .map_err(|e| KeyringError::store_access(format!("Failed to encode policy: {e}")))?;
        write_item(&policy_account(&request.alias), &encoded)?;

        let attestation_chain = match &request.attestation_challenge {
            Some(challenge) => {
                let statement = AttestationStatement::issue(
                    challenge,
                    public_key.clone(),
                    self.attestation_public.clone(),
                    Utc::now(),
                    |payload| {
                        let der = self.attestation_key.sign(payload)?;
                        Ok(EcSignature::from_der(SignatureAlgorithm::Es256, &der)?)
                    },
                )?;
                statement_chain(&statement)?
            },
            None => Vec::new(),
        };

        info!(
            alias = %request.alias,
            attested = !attestation_chain.is_empty(),
            "Key generated successfully in Secure Enclave"
        );

        Ok(GeneratedKey {
            public_key,
            attestation_chain,
        })
    }

    async fn load(&self, alias: &str) -> Result<Option<StoredKey>, KeyringError> {
        let Some(key_ref) = find_key(&key_tag(alias))? else {
            return Ok(None);
        };
        let public_key = key_ref.public_key()?;

        let (algorithm, policy) = match Self::metadata(alias)? {
            Some(metadata) => (metadata.algorithm, metadata.policy),
            None => {
                warn!(alias = %alias, "Policy item missing, assuming no user authentication");
                (SignatureAlgorithm::Es256, AccessPolicy::none())
            },
        };

        Ok(Some(StoredKey {
            algorithm,
            public_key,
            policy,
        }))
    }

    async fn sign(
        &self,
        alias: &str,
        algorithm: SignatureAlgorithm,
        data: &[u8],
        auth: Option<&AuthContext>,
    ) -> Result<EcSignature, KeyringError> {
        debug!(alias = %alias, authenticated = auth.is_some(), "Secure Enclave sign");

        ensure_algorithm(alias, SignatureAlgorithm::Es256, algorithm)?;
        let policy = Self::metadata(alias)?.map_or_else(AccessPolicy::none, |m| m.policy);

        let der = if policy.requires_user_authentication {
            let auth = auth.ok_or(KeyringError::AuthenticationRequired)?;
            self.sign_gated(alias, &policy, data, auth).await?
        } else {
            find_key(&key_tag(alias))?
                .ok_or_else(|| KeyringError::key_not_found(alias))?
                .sign(data)?
        };
        info!(alias = %alias, "Signature created successfully");
        Ok(EcSignature::from_der(algorithm, &der)?)
    }

    async fn store_chain(&self, alias: &str, chain: &[Vec<u8>]) -> Result<(), KeyringError> {
        let encoded: Vec<String> = chain.iter().map(hex::encode).collect();
        let bytes = serde_json::to_vec(&encoded)
            .map_err(|e| KeyringError::store_access(format!("Failed to encode chain: {e}")))?;
        write_item(&chain_account(alias), &bytes)?;
        info!(alias = %alias, chain_len = chain.len(), "Certificate chain stored in keychain");
        Ok(())
    }

    async fn load_chain(&self, alias: &str) -> Result<Option<Vec<Vec<u8>>>, KeyringError> {
        let Some(bytes) = read_item(&chain_account(alias))? else {
            return Ok(None);
        };
        let encoded: Vec<String> = serde_json::from_slice(&bytes)
            .map_err(|e| KeyringError::store_access(format!("Corrupt chain item {alias}: {e}")))?;
        let chain = encoded
            .iter()
            .map(hex::decode)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| KeyringError::store_access(format!("Corrupt chain item {alias}: {e}")))?;
        Ok(Some(chain))
    }
}
